//! One writer, several independent readers of the same stream.

use segbuf::{AccessLevel, BufferConfig, BufferError, BufferResult, Dispatcher, Participant};
use std::sync::Arc;
use std::thread;

const COUNT: u64 = 50_000;
const READERS: usize = 3;

fn main() -> BufferResult<()> {
    segbuf::init_tracing();

    let config = BufferConfig {
        segment_capacity: 256,
        prune_interval_ms: 500,
        ..BufferConfig::default()
    };
    let dispatcher = Arc::new(Dispatcher::with_config(config)?);
    let writer = Participant::make(Some("source"), AccessLevel::WRITE);

    for value in 1..=COUNT {
        dispatcher.write(value, &writer)?;
    }
    println!(
        "wrote {COUNT} items into {} segments",
        dispatcher.segment_count()
    );

    let consumers: Vec<_> = (0..READERS)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || -> BufferResult<u64> {
                let reader =
                    Participant::make(Some(&format!("sink-{i}")), AccessLevel::READ);
                let mut received = 0u64;
                loop {
                    match dispatcher.read(&reader) {
                        Ok(value) => {
                            assert_eq!(value, received + 1);
                            received += 1;
                        }
                        Err(BufferError::EndOfStream) => break,
                        Err(other) => return Err(other),
                    }
                }
                dispatcher.release(&reader)?;
                Ok(received)
            })
        })
        .collect();

    for (i, consumer) in consumers.into_iter().enumerate() {
        let received = consumer.join().expect("consumer panicked")?;
        println!("sink-{i} received {received} items");
    }

    dispatcher.release(&writer)?;
    println!("stats: {:?}", dispatcher.stats());
    dispatcher.shutdown();
    Ok(())
}
