//! # Live Pipeline
//!
//! A live source feeding a sink through an identity element, with every
//! bus message printed as it arrives.
//!
//! ```text
//! [FakeSrc is-live] → [Identity] → [FakeSink]
//! ```
//!
//! PAUSED returns NO_PREROLL (the live source produces nothing until it
//! runs); PLAYING completes once the sink has prerolled on the first
//! buffer.
//!
//! Run: `cargo run --example live_pipeline`

use parallax_state::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let pipeline = Pipeline::new("live");
    let src = FakeSrc::new(
        FakeSrcConfig::default()
            .with_live(true)
            .with_interval(Duration::from_millis(20)),
    )
    .into_element("src");
    let identity = Identity::new();
    let passed = identity.stats();
    let identity = identity.into_element("identity");
    let sink = FakeSink::new(FakeSinkConfig::default()).into_element("sink");

    pipeline.add_many(&[&src, &identity, &sink])?;
    Element::link_many(&[&src, &identity, &sink])?;

    let watch = pipeline.bus().subscribe();
    let printer = tokio::spawn(async move {
        while let Some(msg) = watch.recv_async().await {
            println!("[bus] {}", msg);
            if msg.matches(MessageType::ERROR) {
                break;
            }
        }
    });

    let control = pipeline.clone();
    let ret = tokio::task::spawn_blocking(move || control.set_state(State::Paused))
        .await
        .map_err(|e| Error::InvalidState {
            state: State::Null,
            reason: e.to_string(),
        })?;
    println!("PAUSED: {}", ret);

    let control = pipeline.clone();
    let (ret, current, pending) = tokio::task::spawn_blocking(move || {
        control.set_state(State::Playing);
        control.get_state(Some(Duration::from_secs(5)))
    })
    .await
    .map_err(|e| Error::InvalidState {
        state: State::Paused,
        reason: e.to_string(),
    })?;
    println!("PLAYING: {} (current {}, pending {:?})", ret, current, pending);

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!(
        "running time {}, {} buffers through identity",
        pipeline.running_time(),
        passed.buffer_count()
    );

    let control = pipeline.clone();
    tokio::task::spawn_blocking(move || control.set_state(State::Null))
        .await
        .map_err(|e| Error::InvalidState {
            state: State::Playing,
            reason: e.to_string(),
        })?;

    printer.abort();
    Ok(())
}
