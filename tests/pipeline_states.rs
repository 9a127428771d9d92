//! State protocol tests on bins and pipelines.

mod common;

use common::{drain_state_changes, init_tracing, sources_for};
use parallax_state::buffer::Buffer;
use parallax_state::bus::BusSyncReply;
use parallax_state::clock::{ClockTime, ManualClock};
use parallax_state::element::{Element, ElementFlags, ElementImpl};
use parallax_state::elements::{
    FailingElement, FakeSink, FakeSinkConfig, FakeSrc, FakeSrcConfig, Identity,
};
use parallax_state::error::Error;
use parallax_state::message::{MessageKind, MessageType};
use parallax_state::pipeline::{Bin, ClockSelection, Pipeline, PipelineConfig};
use parallax_state::state::{State, StateChange, StateChangeReturn};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

struct Plain;
impl ElementImpl for Plain {}

fn fakesrc(name: &str, live: bool) -> Element {
    FakeSrc::new(FakeSrcConfig::default().with_live(live)).into_element(name)
}

fn fakesink(name: &str) -> Element {
    FakeSink::new(FakeSinkConfig::default()).into_element(name)
}

#[test]
fn test_bin_child_message_before_bin() {
    let pipeline = Pipeline::new("pipeline");
    let child = Element::builder("child").build(Plain);
    pipeline.add(&child).unwrap();

    assert_eq!(pipeline.set_state(State::Ready), StateChangeReturn::Success);
    let changes = drain_state_changes(&pipeline.bus());
    assert_eq!(
        sources_for(&changes, State::Null, State::Ready),
        ["child", "pipeline"]
    );
    pipeline.set_state(State::Null);
}

#[test]
fn test_non_live_pipeline_prerolls() {
    init_tracing();
    let pipeline = Pipeline::new("pipeline");
    let src = fakesrc("src", false);
    let sink = fakesink("sink");
    pipeline.add_many(&[&src, &sink]).unwrap();
    src.link(&sink).unwrap();

    assert_eq!(pipeline.set_state(State::Paused), StateChangeReturn::Async);
    assert_eq!(
        pipeline.get_state(WAIT),
        (StateChangeReturn::Success, State::Paused, None)
    );
    assert_eq!(sink.current_state(), State::Paused);

    // Already prerolled: PLAYING completes synchronously.
    assert_eq!(pipeline.set_state(State::Playing), StateChangeReturn::Success);
    assert_eq!(
        pipeline.get_state(Some(Duration::ZERO)),
        (StateChangeReturn::Success, State::Playing, None)
    );

    assert_eq!(pipeline.set_state(State::Null), StateChangeReturn::Success);
    assert_eq!(src.current_state(), State::Null);
    assert_eq!(sink.current_state(), State::Null);
}

#[test]
fn test_pipeline_async_done_after_children() {
    let pipeline = Pipeline::new("pipeline");
    let src = fakesrc("src", false);
    let sink = fakesink("sink");
    pipeline.add_many(&[&src, &sink]).unwrap();
    src.link(&sink).unwrap();
    let watch = pipeline.bus().subscribe();

    pipeline.set_state(State::Paused);
    pipeline.get_state(WAIT);

    let mut seen = Vec::new();
    while let Some(msg) = watch.try_recv() {
        match msg.kind() {
            MessageKind::AsyncStart | MessageKind::AsyncDone => {
                seen.push((msg.source().to_string(), msg.message_type()))
            }
            _ => {}
        }
    }
    // Children's async messages are consumed by the pipeline.
    assert_eq!(
        seen,
        [
            ("pipeline".to_string(), MessageType::ASYNC_START),
            ("pipeline".to_string(), MessageType::ASYNC_DONE),
        ]
    );
    pipeline.set_state(State::Null);
}

#[test]
fn test_live_pipeline_no_preroll() {
    let pipeline = Pipeline::new("pipeline");
    let src = fakesrc("src", true);
    let sink = fakesink("sink");
    pipeline.add_many(&[&src, &sink]).unwrap();
    src.link(&sink).unwrap();
    // Liveness reaches the pipeline only through the NO_PREROLL return.
    assert!(src.is_live());
    assert!(!pipeline.is_live());

    assert_eq!(pipeline.set_state(State::Paused), StateChangeReturn::NoPreroll);
    assert_eq!(
        pipeline.get_state(Some(Duration::ZERO)),
        (StateChangeReturn::NoPreroll, State::Paused, None)
    );
    // The sink never got data.
    assert_eq!(
        sink.get_state(Some(Duration::ZERO)),
        (StateChangeReturn::Async, State::Ready, Some(State::Paused))
    );

    pipeline.remove(&src).unwrap();
    assert_eq!(
        pipeline.get_state(Some(Duration::ZERO)),
        (StateChangeReturn::Async, State::Paused, Some(State::Paused))
    );

    assert_eq!(pipeline.set_state(State::Null), StateChangeReturn::Success);
    assert_eq!(sink.current_state(), State::Null);
    assert_eq!(src.set_state(State::Null), StateChangeReturn::Success);
}

#[test]
fn test_live_pipeline_repeat_paused_is_no_preroll() {
    let pipeline = Pipeline::new("pipeline");
    let src = fakesrc("src", true);
    let sink = fakesink("sink");
    pipeline.add_many(&[&src, &sink]).unwrap();
    src.link(&sink).unwrap();

    assert_eq!(pipeline.set_state(State::Paused), StateChangeReturn::NoPreroll);
    drain_state_changes(&pipeline.bus());

    // Asking again re-reports the live outcome instead of waiting on the sink.
    assert_eq!(pipeline.set_state(State::Paused), StateChangeReturn::NoPreroll);
    assert_eq!(
        pipeline.get_state(Some(Duration::from_millis(200))),
        (StateChangeReturn::NoPreroll, State::Paused, None)
    );
    assert_eq!(src.set_state(State::Paused), StateChangeReturn::NoPreroll);
    assert!(drain_state_changes(&pipeline.bus()).is_empty());

    assert_eq!(pipeline.set_state(State::Null), StateChangeReturn::Success);
}

#[test]
fn test_repeat_request_while_async_completes() {
    let pipeline = Pipeline::new("pipeline");
    let sink = fakesink("sink");
    pipeline.add(&sink).unwrap();

    assert_eq!(pipeline.set_state(State::Paused), StateChangeReturn::Async);
    assert_eq!(pipeline.set_state(State::Paused), StateChangeReturn::Async);
    assert_eq!(sink.set_state(State::Paused), StateChangeReturn::Async);
    assert_eq!(
        pipeline.get_state(Some(Duration::ZERO)),
        (StateChangeReturn::Async, State::Ready, Some(State::Paused))
    );

    sink.chain(Buffer::new(0, ClockTime::ZERO)).unwrap();
    assert_eq!(
        pipeline.get_state(WAIT),
        (StateChangeReturn::Success, State::Paused, None)
    );
    assert_eq!(
        sink.get_state(Some(Duration::ZERO)),
        (StateChangeReturn::Success, State::Paused, None)
    );

    pipeline.set_state(State::Null);
}

#[test]
fn test_sync_handler_reads_poster_state() {
    init_tracing();
    let pipeline = Pipeline::new("pipeline");
    let src = FakeSrc::new(FakeSrcConfig::default().with_num_buffers(3)).into_element("src");
    let sink = fakesink("sink");
    pipeline.add_many(&[&src, &sink]).unwrap();
    src.link(&sink).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let weak = pipeline.downgrade();
    let log = Arc::clone(&seen);
    pipeline.bus().set_sync_handler(move |_, msg| {
        let Some((_, new, _)) = msg.parse_state_changed() else {
            return BusSyncReply::Pass;
        };
        let Some(top) = weak.upgrade() else {
            return BusSyncReply::Pass;
        };
        let poster = if top.name() == msg.source() {
            Some(top)
        } else {
            Bin::from_element(&top).and_then(|bin| bin.get_by_name(msg.source()))
        };
        if let Some(poster) = poster {
            let (_, current, _) = poster.get_state(Some(Duration::ZERO));
            assert_eq!(poster.current_state(), current);
            log.lock().unwrap().push((msg.source().to_string(), new, current));
        }
        BusSyncReply::Pass
    });

    assert_eq!(pipeline.set_state(State::Ready), StateChangeReturn::Success);
    pipeline.set_state(State::Paused);
    assert_eq!(
        pipeline.get_state(WAIT),
        (StateChangeReturn::Success, State::Paused, None)
    );

    let seen = seen.lock().unwrap().clone();
    assert!(seen.contains(&("sink".to_string(), State::Ready, State::Ready)));
    assert!(seen.contains(&("pipeline".to_string(), State::Paused, State::Paused)));
    // The element has already moved when its message is seen.
    assert!(seen.iter().all(|(_, new, current)| new == current));

    pipeline.bus().unset_sync_handler();
    pipeline.set_state(State::Null);
}

#[test]
fn test_live_pipeline_playing_message_order() {
    init_tracing();
    let pipeline = Pipeline::new("pipeline");
    let src = fakesrc("src", true);
    let sink = fakesink("sink");
    pipeline.add_many(&[&src, &sink]).unwrap();
    src.link(&sink).unwrap();

    assert_ne!(pipeline.set_state(State::Playing), StateChangeReturn::Failure);
    assert_eq!(
        pipeline.get_state(WAIT),
        (StateChangeReturn::Success, State::Playing, None)
    );

    let changes = drain_state_changes(&pipeline.bus());
    let sink_steps: Vec<_> = changes
        .iter()
        .filter(|c| c.source == "sink" && c.old >= State::Ready)
        .map(|c| (c.old, c.new, c.pending))
        .collect();
    assert_eq!(
        sink_steps,
        [
            (State::Ready, State::Paused, Some(State::Playing)),
            (State::Paused, State::Playing, None),
        ]
    );

    let last = changes.last().unwrap();
    assert_eq!(last.source, "pipeline");
    assert_eq!((last.old, last.new, last.pending), (State::Paused, State::Playing, None));

    let src_final = changes
        .iter()
        .position(|c| c.source == "src" && c.new == State::Playing)
        .unwrap();
    assert!(src_final < changes.len() - 1);

    pipeline.set_state(State::Null);
}

#[test]
fn test_linked_chain_walks_sinks_first() {
    let pipeline = Pipeline::new("pipeline");
    let src = fakesrc("src", false);
    let identity = Identity::new().into_element("identity");
    let sink = fakesink("sink");
    pipeline.add_many(&[&src, &identity, &sink]).unwrap();
    Element::link_many(&[&src, &identity, &sink]).unwrap();

    let sorted: Vec<String> = pipeline
        .iterate_sorted()
        .iter()
        .map(|e| e.name().to_string())
        .collect();
    assert_eq!(sorted, ["sink", "identity", "src"]);

    let bus = pipeline.bus();
    pipeline.set_state(State::Ready);
    let changes = drain_state_changes(&bus);
    assert_eq!(
        sources_for(&changes, State::Null, State::Ready),
        ["sink", "identity", "src", "pipeline"]
    );

    pipeline.set_state(State::Paused);
    assert_eq!(pipeline.get_state(WAIT).0, StateChangeReturn::Success);
    drain_state_changes(&bus);

    assert_eq!(pipeline.set_state(State::Playing), StateChangeReturn::Success);
    let changes = drain_state_changes(&bus);
    assert_eq!(
        sources_for(&changes, State::Paused, State::Playing),
        ["sink", "identity", "src", "pipeline"]
    );
    pipeline.set_state(State::Null);
}

#[test]
fn test_failure_is_not_rolled_back() {
    let pipeline = Pipeline::new("pipeline");
    let sink = FakeSink::new(FakeSinkConfig::default().with_async_preroll(false))
        .into_element("sink");
    let failing = FailingElement::new(StateChange::ReadyToPaused).into_element("failing");
    let src = Element::builder("src").flags(ElementFlags::SOURCE).build(Plain);
    pipeline.add_many(&[&src, &failing, &sink]).unwrap();

    assert_eq!(pipeline.set_state(State::Paused), StateChangeReturn::Failure);
    assert_eq!(sink.current_state(), State::Paused);
    assert_eq!(failing.current_state(), State::Ready);
    // Not visited after the failure.
    assert_eq!(src.current_state(), State::Ready);
    assert_eq!(
        pipeline.get_state(Some(Duration::ZERO)),
        (StateChangeReturn::Failure, State::Ready, None)
    );

    let error = pipeline.bus().pop_filtered(MessageType::ERROR).unwrap();
    assert_eq!(error.source(), "failing");

    assert_eq!(pipeline.set_state(State::Null), StateChangeReturn::Success);
    for element in [&sink, &failing, &src] {
        assert_eq!(element.current_state(), State::Null);
    }
}

#[test]
fn test_unlinked_source_error_fails_preroll() {
    let pipeline = Pipeline::new("pipeline");
    let src = fakesrc("src", false);
    let sink = fakesink("sink");
    pipeline.add_many(&[&src, &sink]).unwrap();

    let ret = pipeline.set_state(State::Paused);
    assert!(matches!(
        ret,
        StateChangeReturn::Async | StateChangeReturn::Failure
    ));
    assert_eq!(pipeline.get_state(WAIT).0, StateChangeReturn::Failure);

    let error = pipeline.bus().timed_pop_filtered(WAIT, MessageType::ERROR).unwrap();
    assert_eq!(error.source(), "src");
    assert!(matches!(
        error.kind(),
        MessageKind::Error { error: Error::NotLinked(_) }
    ));

    assert_eq!(pipeline.set_state(State::Null), StateChangeReturn::Success);
    assert_eq!(sink.current_state(), State::Null);
}

#[test]
fn test_clock_selection_and_base_time() {
    let clock = Arc::new(ManualClock::new("sink-clock"));
    clock.set(ClockTime::from_secs(3));

    let pipeline = Pipeline::new("pipeline");
    let sink = FakeSink::new(
        FakeSinkConfig::default()
            .with_async_preroll(false)
            .with_clock(clock.clone()),
    )
    .into_element("sink");
    pipeline.add(&sink).unwrap();

    assert_eq!(pipeline.set_state(State::Playing), StateChangeReturn::Success);
    let selected = pipeline.clock().unwrap();
    assert_eq!(selected.name(), "sink-clock");
    assert_eq!(sink.base_time(), ClockTime::from_secs(3));
    assert_eq!(pipeline.base_time(), ClockTime::from_secs(3));

    let new_clock = pipeline.bus().pop_filtered(MessageType::NEW_CLOCK).unwrap();
    assert_eq!(
        new_clock.kind(),
        &MessageKind::NewClock {
            clock: "sink-clock".into()
        }
    );
    pipeline.set_state(State::Null);
}

#[test]
fn test_fixed_system_clock_overrides_children() {
    let clock = Arc::new(ManualClock::new("sink-clock"));
    let pipeline = Pipeline::with_config(
        PipelineConfig::new("pipeline").with_clock(ClockSelection::System),
    );
    let sink = FakeSink::new(
        FakeSinkConfig::default()
            .with_async_preroll(false)
            .with_clock(clock),
    )
    .into_element("sink");
    pipeline.add(&sink).unwrap();

    pipeline.set_state(State::Playing);
    assert_ne!(pipeline.clock().unwrap().name(), "sink-clock");
    assert!(sink.base_time().is_some());
    pipeline.set_state(State::Null);
}

#[test]
fn test_locked_child_is_skipped() {
    let pipeline = Pipeline::new("pipeline");
    let locked = Element::builder("locked").build(Plain);
    let free = Element::builder("free").build(Plain);
    pipeline.add_many(&[&locked, &free]).unwrap();
    assert!(locked.set_locked_state(true));

    pipeline.set_state(State::Playing);
    assert_eq!(free.current_state(), State::Playing);
    assert_eq!(locked.current_state(), State::Null);

    pipeline.set_state(State::Null);
}

#[test]
fn test_sync_state_with_parent() {
    let pipeline = Pipeline::new("pipeline");
    assert_eq!(pipeline.set_state(State::Playing), StateChangeReturn::Success);

    let late = Element::builder("late").build(Plain);
    assert!(late.sync_state_with_parent().is_err());

    pipeline.add(&late).unwrap();
    assert_eq!(late.current_state(), State::Null);
    assert_eq!(late.sync_state_with_parent(), Ok(StateChangeReturn::Success));
    assert_eq!(late.current_state(), State::Playing);

    pipeline.set_state(State::Null);
    assert_eq!(late.current_state(), State::Null);
}

#[test]
fn test_nested_bin_aggregates() {
    let pipeline = Pipeline::new("pipeline");
    let inner = Bin::new("inner");
    let sink = fakesink("sink");
    let src = fakesrc("src", false);
    inner.add(&sink).unwrap();
    pipeline.add_many(&[&src, inner.as_element()]).unwrap();
    src.link(&sink).unwrap();

    assert_eq!(pipeline.set_state(State::Paused), StateChangeReturn::Async);
    assert_eq!(
        pipeline.get_state(WAIT),
        (StateChangeReturn::Success, State::Paused, None)
    );
    assert_eq!(inner.current_state(), State::Paused);

    let changes = drain_state_changes(&pipeline.bus());
    let order = sources_for(&changes, State::Ready, State::Paused);
    assert_eq!(order.last().map(String::as_str), Some("pipeline"));
    let inner_pos = order.iter().position(|s| s == "inner").unwrap();
    let sink_pos = order.iter().position(|s| s == "sink").unwrap();
    assert!(sink_pos < inner_pos);

    pipeline.set_state(State::Null);
}

#[test]
fn test_bin_membership_errors() {
    let outer = Bin::new("outer");
    let inner = Bin::new("inner");
    let a = Element::builder("a").build(Plain);
    let twin = Element::builder("a").build(Plain);

    outer.add(inner.as_element()).unwrap();
    inner.add(&a).unwrap();

    assert!(matches!(outer.add(outer.as_element()), Err(Error::AddSelf(_))));
    assert!(matches!(inner.add(outer.as_element()), Err(Error::AddSelf(_))));
    assert!(matches!(outer.add(&a), Err(Error::AlreadyHasParent(_))));
    assert!(matches!(inner.add(&twin), Err(Error::NameInUse(_))));
    assert!(matches!(outer.remove(&a), Err(Error::NotAChild(_))));

    assert_eq!(outer.get_by_name("a"), Some(a.clone()));
    inner.remove(&a).unwrap();
    assert!(a.parent().is_none());
    assert_eq!(outer.get_by_name("a"), None);
}

#[test]
fn test_remove_keeps_child_state() {
    let pipeline = Pipeline::new("pipeline");
    let child = Element::builder("child").build(Plain);
    pipeline.add(&child).unwrap();
    pipeline.set_state(State::Paused);

    pipeline.remove(&child).unwrap();
    assert_eq!(child.current_state(), State::Paused);
    assert_eq!(pipeline.num_children(), 0);

    child.set_state(State::Null);
    pipeline.set_state(State::Null);
}

#[test]
fn test_eos_reaches_pipeline_bus() {
    let pipeline = Pipeline::new("pipeline");
    let src = FakeSrc::new(FakeSrcConfig::default().with_num_buffers(5)).into_element("src");
    let sink = FakeSink::new(FakeSinkConfig::default());
    let stats = sink.stats();
    let sink = sink.into_element("sink");
    pipeline.add_many(&[&src, &sink]).unwrap();
    src.link(&sink).unwrap();

    pipeline.set_state(State::Playing);
    let eos = pipeline.bus().timed_pop_filtered(WAIT, MessageType::EOS).unwrap();
    assert_eq!(eos.source(), "sink");
    assert_eq!(stats.buffers(), 5);
    assert!(stats.is_eos());

    pipeline.set_state(State::Null);
}
