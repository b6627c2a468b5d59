use async_trait::async_trait;
use std::fmt::Debug;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::{error::SinkError, model::DeviceMessage};

/// Outbound channel to the paired device.
#[async_trait]
pub trait MessageSink: Send + Sync + Debug {
    async fn send(&self, message: &DeviceMessage) -> Result<(), SinkError>;
}

/// Writes each message as one JSON object per line.
///
/// The bridge reads these lines and forwards them over the device link.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl<W> MessageSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: &DeviceMessage) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WeatherIcon;

    #[tokio::test]
    async fn writes_one_json_object_per_line() {
        let sink = JsonLinesSink::new(Vec::new());

        sink.send(&DeviceMessage {
            icon: Some(WeatherIcon::Snow),
            temperature: -2,
            condition: "snow".into(),
        })
        .await
        .unwrap();
        sink.send(&DeviceMessage::location_error()).await.unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec![
            r#"{"0":3,"1":-2,"2":"snow"}"#,
            r#"{"1":0,"2":"error"}"#,
        ]);
    }
}
