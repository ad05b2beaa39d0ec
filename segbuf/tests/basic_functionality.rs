//! End-to-end scenarios for the segmented buffer

use segbuf::{AccessLevel, BufferConfig, BufferError, BufferResult, Dispatcher, Participant};
use std::time::{Duration, Instant};

#[test]
fn single_writer_single_reader_in_order() -> BufferResult<()> {
    const COUNT: u32 = 10_035;

    let dispatcher = Dispatcher::new()?;
    let (reader, writer) = Participant::make_pair("sink", "source");

    for value in 1..=COUNT {
        dispatcher.write(value, &writer)?;
    }
    // 10035 items at the default capacity of 1024 slots.
    assert!(dispatcher.segment_count() >= 10);

    for expected in 1..=COUNT {
        assert_eq!(dispatcher.read(&reader)?, expected);
    }
    assert!(matches!(
        dispatcher.read(&reader),
        Err(BufferError::EndOfStream)
    ));
    Ok(())
}

#[test]
fn cursor_spans_segment_boundaries() -> BufferResult<()> {
    let config = BufferConfig {
        segment_capacity: 4,
        prune_interval_ms: 3_600_000,
        ..BufferConfig::default()
    };
    let dispatcher = Dispatcher::with_config(config)?;
    let (reader, writer) = Participant::make_pair("sink", "source");

    for value in 0..10u32 {
        dispatcher.write(value, &writer)?;
    }
    assert_eq!(reader.cursor_position(), None);

    for _ in 0..5 {
        dispatcher.read(&reader)?;
    }
    // Five reads at capacity four: second segment, one slot consumed.
    assert_eq!(reader.cursor_position(), Some((1, 1)));
    Ok(())
}

#[test]
fn round_trip_preserves_owned_items() -> BufferResult<()> {
    let config = BufferConfig {
        segment_capacity: 3,
        prune_interval_ms: 3_600_000,
        ..BufferConfig::default()
    };
    let dispatcher = Dispatcher::with_config(config)?;
    let (reader, writer) = Participant::make_pair("sink", "source");

    let items: Vec<String> = (0..10).map(|i| format!("record-{i}")).collect();
    for item in &items {
        dispatcher.write(item.clone(), &writer)?;
    }
    for expected in &items {
        assert_eq!(&dispatcher.read(&reader)?, expected);
    }
    Ok(())
}

#[test]
fn capability_violations_leave_the_buffer_untouched() -> BufferResult<()> {
    let dispatcher = Dispatcher::new()?;
    let (reader, writer) = Participant::make_pair("sink", "source");
    dispatcher.write(1u32, &writer)?;

    let before = dispatcher.segment_count();
    assert!(matches!(
        dispatcher.write(2u32, &reader),
        Err(BufferError::InsufficientCapability { .. })
    ));
    assert_eq!(dispatcher.segment_count(), before);

    assert!(matches!(
        dispatcher.read(&writer),
        Err(BufferError::InsufficientCapability { .. })
    ));
    assert_eq!(dispatcher.read(&reader)?, 1);
    Ok(())
}

#[test]
fn with_participant_routes_nested_operations() -> BufferResult<()> {
    let dispatcher = Dispatcher::new()?;
    let (reader, writer) = Participant::make_pair("sink", "source");

    dispatcher.with_participant(&writer, |d| d.write(41u32, &writer))??;
    let value = dispatcher.with_participant(&reader, |d| d.read(&reader))??;
    assert_eq!(value, 41);
    Ok(())
}

#[test]
fn pruner_empties_fully_released_buffer() -> BufferResult<()> {
    const INTERVAL_MS: u64 = 100;
    let config = BufferConfig {
        segment_capacity: 64,
        prune_interval_ms: INTERVAL_MS,
        ..BufferConfig::default()
    };
    let dispatcher = Dispatcher::with_config(config)?;
    let (reader, writer) = Participant::make_pair("sink", "source");

    for value in 0..(10 * 64u32) {
        dispatcher.write(value, &writer)?;
    }
    assert_eq!(dispatcher.segment_count(), 10);

    dispatcher.release(&writer)?;
    while dispatcher.read(&reader).is_ok() {}
    dispatcher.release(&reader)?;
    assert_eq!(writer.ref_count(), 0);
    assert_eq!(reader.ref_count(), 0);

    let deadline = Instant::now() + Duration::from_millis(2 * INTERVAL_MS + 400);
    while dispatcher.segment_count() > 0 {
        assert!(
            Instant::now() < deadline,
            "pruner left {} segments behind",
            dispatcher.segment_count()
        );
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(dispatcher.stats().segments_pruned >= 10);
    Ok(())
}

#[test]
fn late_reader_starts_at_the_oldest_live_segment() -> BufferResult<()> {
    let config = BufferConfig {
        segment_capacity: 4,
        prune_interval_ms: 3_600_000,
        ..BufferConfig::default()
    };
    let dispatcher = Dispatcher::with_config(config)?;
    let writer = Participant::make(Some("source"), AccessLevel::WRITE);

    for value in 0..12u32 {
        dispatcher.write(value, &writer)?;
    }

    let late = Participant::make(Some("latecomer"), AccessLevel::READ);
    assert!(dispatcher.has_next(&late)?);
    assert_eq!(dispatcher.read(&late)?, 0);
    Ok(())
}

#[test]
fn read_write_participant_consumes_its_own_stream() -> BufferResult<()> {
    let dispatcher = Dispatcher::new()?;
    let both = Participant::make(Some("loopback"), AccessLevel::READ_WRITE);

    for value in 0..5u32 {
        dispatcher.write(value, &both)?;
    }
    for expected in 0..5u32 {
        assert_eq!(dispatcher.read(&both)?, expected);
    }
    assert!(matches!(
        dispatcher.read(&both),
        Err(BufferError::EndOfStream)
    ));
    Ok(())
}
