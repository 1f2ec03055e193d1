use energy_domain::domain::{RawRecord, WeatherSample};
use time::PrimitiveDateTime;

/// Length-prefixed so ("ab", "c") and ("a", "bc") hash differently.
fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    let len = s.len() as u32;
    hasher.update(&len.to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_opt_str(hasher: &mut blake3::Hasher, s: Option<&str>) {
    match s {
        Some(v) => {
            hasher.update(&[1]);
            hash_str(hasher, v);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn hash_f64(hasher: &mut blake3::Hasher, v: f64) {
    hasher.update(&v.to_bits().to_le_bytes());
}

fn hash_opt_ts(hasher: &mut blake3::Hasher, ts: Option<PrimitiveDateTime>) {
    match ts {
        Some(ts) => {
            hasher.update(&[1]);
            hasher.update(&ts.assume_utc().unix_timestamp().to_le_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn hash_opt_weather(hasher: &mut blake3::Hasher, weather: Option<&WeatherSample>) {
    match weather {
        Some(w) => {
            hasher.update(&[1]);
            hash_f64(hasher, w.temperature);
            hash_f64(hasher, w.precipitation);
            hash_f64(hasher, w.wind_speed);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

/// Running blake3 digest over normalized records in stream order.
///
/// Two runs over identical inputs produce the same fingerprint, which lets
/// consumers skip re-rendering unchanged results.
pub struct DatasetFingerprint {
    hasher: blake3::Hasher,
    records: u64,
}

impl Default for DatasetFingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetFingerprint {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
            records: 0,
        }
    }

    pub fn update(&mut self, r: &RawRecord) {
        let h = &mut self.hasher;
        hash_str(h, &r.utility);
        hash_opt_ts(h, r.ts);
        hash_f64(h, r.energy);
        hash_opt_str(h, r.building_code.as_deref());
        hash_opt_str(h, r.building_name.as_deref());
        hash_f64(h, r.area);
        hash_opt_weather(h, r.weather.as_ref());
        self.records += 1;
    }

    pub fn finalize(&self) -> String {
        let mut h = self.hasher.clone();
        h.update(&self.records.to_le_bytes());
        h.finalize().to_hex().to_string()
    }
}
