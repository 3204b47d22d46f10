use std::time::Duration;

use bindery_host_log::{
  ChannelSink, EventType, LogCapture, LogMethod, RequestInfo, Severity, TriggerMeta, TriggerSource,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::LocalSet;

fn request_info() -> RequestInfo {
  RequestInfo {
    event_type: Some(EventType::OnClick),
    trigger_meta: Some(TriggerMeta {
      source: Some(TriggerSource {
        id: "w1".to_string(),
        name: "Button1".to_string(),
        entity_type: "WIDGET".to_string(),
      }),
      trigger_property_name: Some("onClick".to_string()),
    }),
  }
}

#[tokio::test]
async fn test_many_captures_in_one_window_make_one_batch() {
  LocalSet::new()
    .run_until(async {
      let (sender, mut receiver) = mpsc::unbounded_channel();
      let capture = LogCapture::new(Duration::from_millis(20), ChannelSink::new(sender));
      capture.set_request_info(request_info());

      for i in 0..500 {
        capture.capture(LogMethod::Log, vec![json!(i)]);
      }

      let batch = receiver.recv().await.unwrap();
      assert_eq!(batch.logs.len(), 500);
      assert_eq!(batch.logs[499].data, vec![json!(499)]);
      assert_eq!(batch.event_type, Some(EventType::OnClick));
      assert_eq!(
        batch.trigger_meta.unwrap().trigger_property_name.as_deref(),
        Some("onClick")
      );

      tokio::time::sleep(Duration::from_millis(50)).await;
      assert!(receiver.try_recv().is_err());
    })
    .await;
}

#[tokio::test]
async fn test_new_capture_resets_timer() {
  LocalSet::new()
    .run_until(async {
      let (sender, mut receiver) = mpsc::unbounded_channel();
      let capture = LogCapture::new(Duration::from_millis(60), ChannelSink::new(sender));

      capture.capture(LogMethod::Info, vec![json!("first")]);
      tokio::time::sleep(Duration::from_millis(30)).await;
      capture.capture(LogMethod::Warn, vec![json!("second")]);
      tokio::time::sleep(Duration::from_millis(40)).await;
      // 70ms after the first capture but only 40ms after the second
      assert!(receiver.try_recv().is_err());

      let batch = receiver.recv().await.unwrap();
      assert_eq!(batch.logs.len(), 2);
      assert_eq!(batch.logs[1].severity, Severity::Warning);
    })
    .await;
}

#[tokio::test]
async fn test_flush_is_idempotent() {
  LocalSet::new()
    .run_until(async {
      let (sender, _receiver) = mpsc::unbounded_channel();
      let capture = LogCapture::new(Duration::from_secs(60), ChannelSink::new(sender));

      capture.capture(LogMethod::Log, vec![json!("a")]);
      capture.capture(LogMethod::Table, vec![json!([{"a": 1}])]);
      assert_eq!(capture.flush().len(), 2);
      assert!(capture.flush().is_empty());
      assert_eq!(capture.buffered(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_disable_keeps_buffer() {
  LocalSet::new()
    .run_until(async {
      let (sender, mut receiver) = mpsc::unbounded_channel();
      let capture = LogCapture::new(Duration::from_millis(10), ChannelSink::new(sender));

      assert!(capture.capture(LogMethod::Log, vec![json!("kept")]));
      capture.disable();
      assert!(!capture.capture(LogMethod::Log, vec![json!("dropped")]));
      assert_eq!(capture.buffered(), 1);

      let batch = receiver.recv().await.unwrap();
      assert_eq!(batch.logs.len(), 1);
      assert_eq!(batch.logs[0].data, vec![json!("kept")]);

      capture.enable();
      assert!(capture.capture(LogMethod::Log, vec![json!("again")]));
    })
    .await;
}

#[tokio::test]
async fn test_flush_now_sends_immediately() {
  LocalSet::new()
    .run_until(async {
      let (sender, mut receiver) = mpsc::unbounded_channel();
      let capture = LogCapture::new(Duration::from_secs(60), ChannelSink::new(sender));

      capture.capture(LogMethod::Error, vec![json!("bad")]);
      assert_eq!(capture.flush_now(), 1);
      let batch = receiver.try_recv().unwrap();
      assert_eq!(batch.logs[0].severity, Severity::Error);

      assert_eq!(capture.flush_now(), 0);
      assert!(receiver.try_recv().is_err());
    })
    .await;
}
