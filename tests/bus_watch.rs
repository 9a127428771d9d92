//! Consuming pipeline messages asynchronously.

use parallax_state::bus::BusSyncReply;
use parallax_state::elements::{FakeSink, FakeSinkConfig, FakeSrc, FakeSrcConfig};
use parallax_state::message::{MessageKind, MessageType};
use parallax_state::pipeline::Pipeline;
use parallax_state::state::{State, StateChangeReturn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn pipeline_with_buffers(num_buffers: u64) -> Pipeline {
    let pipeline = Pipeline::new("pipeline");
    let src = FakeSrc::new(FakeSrcConfig::default().with_num_buffers(num_buffers))
        .into_element("src");
    let sink = FakeSink::new(FakeSinkConfig::default()).into_element("sink");
    pipeline.add_many(&[&src, &sink]).unwrap();
    src.link(&sink).unwrap();
    pipeline
}

#[tokio::test]
async fn test_watch_sees_eos_after_playing() {
    let pipeline = pipeline_with_buffers(3);
    let watch = pipeline.bus().subscribe();

    let control = pipeline.clone();
    let ret = tokio::task::spawn_blocking(move || control.set_state(State::Playing))
        .await
        .unwrap();
    assert_ne!(ret, StateChangeReturn::Failure);

    let mut playing = false;
    let mut eos = false;
    while !(playing && eos) {
        let msg = watch
            .recv_timeout_async(Duration::from_secs(5))
            .await
            .expect("pipeline stalled");
        match msg.kind() {
            MessageKind::StateChanged {
                new: State::Playing,
                pending: None,
                ..
            } if msg.source() == "pipeline" => playing = true,
            MessageKind::Eos => eos = true,
            MessageKind::Error { error } => panic!("unexpected error: {error}"),
            _ => {}
        }
    }

    let control = pipeline.clone();
    tokio::task::spawn_blocking(move || control.set_state(State::Null))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_sync_handler_sees_every_message() {
    let pipeline = pipeline_with_buffers(1);
    let bus = pipeline.bus();
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = Arc::clone(&seen);
    bus.set_sync_handler(move |_bus, msg| {
        seen_clone.fetch_add(1, Ordering::Relaxed);
        if msg.matches(MessageType::STREAM_START) {
            BusSyncReply::Drop
        } else {
            BusSyncReply::Pass
        }
    });

    let control = pipeline.clone();
    tokio::task::spawn_blocking(move || {
        control.set_state(State::Paused);
        control.get_state(Some(Duration::from_secs(5)))
    })
    .await
    .unwrap();

    assert!(seen.load(Ordering::Relaxed) > 0);
    let mut stream_starts = 0;
    while let Some(msg) = bus.pop() {
        if msg.matches(MessageType::STREAM_START) {
            stream_starts += 1;
        }
    }
    assert_eq!(stream_starts, 0);

    bus.unset_sync_handler();
    pipeline.set_state(State::Null);
}
