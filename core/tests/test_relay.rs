#[cfg(test)]
mod relay_tests {
    use std::io::{Cursor, Read, Write};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use proptest::prelude::*;
    use ultragz_core::relay::{ByteRelayBuffer, RelayError, RelayMode, RelayReader, RelayWorker, RelayWriter};

    /// Collects everything written into a shared vector.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn pump(buffer: Arc<ByteRelayBuffer>, chunks: Vec<Vec<u8>>) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            for chunk in chunks {
                buffer.write(&chunk).unwrap();
            }
            buffer.close();
        })
    }

    fn drain(buffer: &ByteRelayBuffer, read_size: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut chunk = vec![0u8; read_size];
        loop {
            let n = buffer.read(&mut chunk);
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn buffer_preserves_fifo_order(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..300), 0..40),
            capacity in 1usize..128,
            read_size in 1usize..97,
        ) {
            let buffer = Arc::new(ByteRelayBuffer::new(capacity));
            let expected: Vec<u8> = chunks.concat();
            let writer = pump(Arc::clone(&buffer), chunks);
            let got = drain(&buffer, read_size);
            writer.join().unwrap();
            prop_assert_eq!(got, expected);
        }
    }

    #[test]
    fn zero_capacity_is_bumped_to_one() {
        let buffer = ByteRelayBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
    }

    #[test]
    fn write_after_close_reports_progress() {
        let buffer = ByteRelayBuffer::new(8);
        buffer.write(b"abc").unwrap();
        buffer.close();
        buffer.close();
        match buffer.write(b"more") {
            Err(RelayError::Closed { written, requested }) => {
                assert_eq!(written, 0);
                assert_eq!(requested, 4);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
        // Data written before close is still readable.
        assert_eq!(drain(&buffer, 2), b"abc");
    }

    #[test]
    fn closing_wakes_a_blocked_writer() {
        let buffer = Arc::new(ByteRelayBuffer::new(4));
        let writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.write(&[1u8; 10]))
        };
        thread::sleep(Duration::from_millis(50));
        buffer.close();
        match writer.join().unwrap() {
            Err(RelayError::Closed { written, requested }) => {
                assert_eq!(written, 4);
                assert_eq!(requested, 10);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn closing_wakes_a_blocked_reader() {
        let buffer = Arc::new(ByteRelayBuffer::new(4));
        let reader = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut chunk = [0u8; 4];
                buffer.read(&mut chunk)
            })
        };
        thread::sleep(Duration::from_millis(50));
        buffer.close();
        assert_eq!(reader.join().unwrap(), 0);
    }

    #[test]
    fn reader_and_writer_wrappers_close_on_drop() {
        let buffer = Arc::new(ByteRelayBuffer::new(16));
        let mut writer = RelayWriter::new(Arc::clone(&buffer));
        let mut reader = RelayReader::new(Arc::clone(&buffer));

        let producer = thread::spawn(move || {
            writer.write_all(b"through the relay").unwrap();
        });
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        producer.join().unwrap();
        assert_eq!(out, "through the relay");

        drop(reader);
        assert!(buffer.is_closed());
    }

    #[test]
    fn source_to_buffer_to_sink_chain() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let middle = Arc::new(ByteRelayBuffer::new(512));
        let sink = SharedSink::default();

        let mut inbound = RelayWorker::source_to_buffer("in", Cursor::new(data.clone()), Arc::clone(&middle)).unwrap();
        let mut outbound = RelayWorker::buffer_to_sink("out", Arc::clone(&middle), sink.clone()).unwrap();

        inbound.shut_down(None).unwrap();
        outbound.shut_down(None).unwrap();
        assert_eq!(*sink.0.lock().unwrap(), data);
        assert!(middle.is_closed());
    }

    #[test]
    fn source_keeps_draining_after_consumer_leaves() {
        let dest = Arc::new(ByteRelayBuffer::new(16));
        let mut worker =
            RelayWorker::source_to_buffer("abandoned", Cursor::new(vec![9u8; 100_000]), Arc::clone(&dest)).unwrap();
        dest.close();
        // The producer must still reach the end of its source.
        worker.shut_down(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn kill_marks_worker_and_detaches() {
        let buffer = Arc::new(ByteRelayBuffer::new(16));
        let mut worker = RelayWorker::buffer_to_sink("stuck", Arc::clone(&buffer), SharedSink::default()).unwrap();
        assert_eq!(worker.mode(), RelayMode::Alive);

        // Nothing closes the buffer, so a short graceful stop times out and kills.
        worker.shut_down(Some(Duration::from_millis(20))).unwrap();
        assert_eq!(worker.mode(), RelayMode::Killed);
        buffer.close();
    }
}
