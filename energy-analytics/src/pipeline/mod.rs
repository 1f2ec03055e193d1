use std::{io, pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source '{source_name}' is missing required columns {missing:?} (found columns: {found:?})")]
    Schema {
        source_name: String,
        missing: Vec<String>,
        found: Vec<String>,
    },
    #[error("failed to read source '{source_name}': {message}{}", reselect_hint(.transient))]
    SourceRead {
        source_name: String,
        message: String,
        transient: bool,
    },
    #[error("no electricity rows found; utility labels seen: {samples:?}")]
    EmptyResult { samples: Vec<String> },
    #[error("transform error: {0}")]
    Transform(String),
}

fn reselect_hint(transient: &bool) -> &'static str {
    if *transient {
        " (the file handle looks temporarily unavailable; re-select the file and retry)"
    } else {
        ""
    }
}

impl PipelineError {
    /// Wrap an I/O failure, flagging handle/permission problems as transient.
    pub fn source_io(source_name: &str, context: &str, err: &io::Error) -> Self {
        let transient = matches!(
            err.kind(),
            io::ErrorKind::PermissionDenied
                | io::ErrorKind::WouldBlock
                | io::ErrorKind::Interrupted
                | io::ErrorKind::TimedOut
        );
        Self::SourceRead {
            source_name: source_name.to_string(),
            message: format!("{context}: {err}"),
            transient,
        }
    }

    pub fn source_message(source_name: &str, message: impl Into<String>) -> Self {
        Self::SourceRead {
            source_name: source_name.to_string(),
            message: message.into(),
            transient: false,
        }
    }

    /// Map a csv error, routing embedded I/O errors through [`PipelineError::source_io`].
    pub fn source_csv(source_name: &str, context: &str, err: &csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Io(io_err) => Self::source_io(source_name, context, io_err),
            _ => Self::source_message(source_name, format!("{context}: {err}")),
        }
    }
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

/// Terminal stage of a pipeline. Sinks own whatever state they accumulate;
/// [`Pipeline::run`] hands the sink back once the stream is exhausted.
#[async_trait::async_trait]
pub trait Sink<T>: Send {
    async fn run<S>(&mut self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

pub struct Pipeline<S, T, K> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<T, T> + Send + Sync>>, // same-type transforms chain
    pub sink: K,
}

impl<T, S, K> Pipeline<S, T, K>
where
    T: Send + 'static,
    S: Source<T> + Send + Sync + 'static,
    K: Sink<T> + Send + 'static,
{
    pub async fn run(self) -> Result<K, PipelineError> {
        let Pipeline {
            source,
            transforms,
            mut sink,
        } = self;
        let mut stream = source.stream().await;

        // Apply transforms in sequence (if any).
        for t in transforms {
            let t_arc = t.clone();
            stream = Box::pin(stream.then(move |item| {
                let t_inner = t_arc.clone();
                async move {
                    match item {
                        Ok(env) => t_inner.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        sink.run(stream).await?;
        Ok(sink)
    }
}
