//! Console destination: one compact JSON line per payload.

use std::io::Write;
use std::sync::Mutex;

use harvester_shared::{HarvesterError, Result};
use serde_json::Value;

use crate::traits::Destination;

pub struct ConsoleDestination {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleDestination {
    /// Console destination writing to stdout.
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl Default for ConsoleDestination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Destination for ConsoleDestination {
    fn kind(&self) -> &'static str {
        "console"
    }

    async fn write(&self, data: &Value, _options: &Value) -> Result<bool> {
        let line = serde_json::to_string(data)
            .map_err(|e| HarvesterError::Destination(format!("console: {e}")))?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| HarvesterError::Destination("console: writer poisoned".into()))?;
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| HarvesterError::Destination(format!("console: {e}")))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn prints_one_json_line_per_write() {
        let buffer = Buffer::default();
        let console = ConsoleDestination::with_writer(Box::new(buffer.clone()));

        assert!(console.write(&json!({"a": 1}), &Value::Null).await.unwrap());
        assert!(console.write(&json!([1, "x"]), &Value::Null).await.unwrap());

        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "{\"a\":1}\n[1,\"x\"]\n");
    }
}
