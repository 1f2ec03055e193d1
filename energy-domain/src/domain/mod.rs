pub mod building;
pub mod calendar;
pub mod reading;
pub mod report;

pub use building::{Building, BuildingType};
pub use calendar::{date_label, hour_floor, hour_label, YearMonth};
pub use reading::{is_electricity_label, RawRecord, WeatherSample};
pub use report::*;
