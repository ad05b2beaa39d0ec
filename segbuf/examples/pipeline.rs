//! Producer/consumer pipeline across two threads.
//!
//! Run with `RUST_LOG=debug` to watch segments being allocated and ids
//! being assigned.

use segbuf::{BufferError, BufferResult, Dispatcher, Participant};
use std::sync::Arc;
use std::thread;

const COUNT: u64 = 100_000;

fn main() -> BufferResult<()> {
    segbuf::init_tracing();

    let dispatcher = Arc::new(Dispatcher::new()?);
    let (reader, writer) = Participant::make_pair("sink", "source");

    let producer = {
        let dispatcher = Arc::clone(&dispatcher);
        thread::spawn(move || -> BufferResult<()> {
            for value in 1..=COUNT {
                dispatcher.write(value, &writer)?;
            }
            Ok(())
        })
    };

    let consumer = {
        let dispatcher = Arc::clone(&dispatcher);
        let reader = Arc::clone(&reader);
        thread::spawn(move || -> BufferResult<u64> {
            let mut sum = 0u64;
            let mut received = 0u64;
            while received < COUNT {
                match dispatcher.read(&reader) {
                    Ok(value) => {
                        sum += value;
                        received += 1;
                    }
                    Err(BufferError::EndOfStream)
                    | Err(BufferError::NoAssociatedSegment { .. }) => thread::yield_now(),
                    Err(other) => return Err(other),
                }
            }
            Ok(sum)
        })
    };

    producer.join().expect("producer panicked")?;
    let sum = consumer.join().expect("consumer panicked")?;

    println!("consumed {COUNT} items, checksum {sum}");
    println!(
        "segments live: {}, reader position: {:?}",
        dispatcher.segment_count(),
        reader.cursor_position()
    );

    dispatcher.release(&reader)?;
    dispatcher.shutdown();
    Ok(())
}
