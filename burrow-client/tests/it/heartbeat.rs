use crate::helper::*;
use burrow_client::{AsyncClient, Config, ConnectionState, ErrorKind};
use burrow_codec::frame::AMQPFrame;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// Stream whose writes start failing when the test says so.
struct FailingStream {
    inner: DuplexStream,
    fail_writes: Arc<AtomicBool>,
}

impl AsyncRead for FailingStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FailingStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if this.fail_writes.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "heartbeat write failed")));
        }

        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[tokio::test(start_paused = true)]
async fn heartbeat_is_sent_every_interval() {
    let config = Config {
        heartbeat: 1,
        ..test_config()
    };
    let (client, mut broker) = connected(config).await;
    let callbacks = Arc::new(AtomicUsize::new(0));
    let on_wire = Arc::new(AtomicUsize::new(0));

    {
        let callbacks = callbacks.clone();

        client.on_heartbeat(move |client| {
            assert!(client.is_connected());

            callbacks.fetch_add(1, Ordering::SeqCst);
        });
    }

    {
        let on_wire = on_wire.clone();

        tokio::spawn(async move {
            while let Some(frame) = broker.recv_any().await {
                if let AMQPFrame::Heartbeat(0) = frame {
                    on_wire.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
    }

    tokio::time::sleep(Duration::from_millis(5_500)).await;

    let beats = on_wire.load(Ordering::SeqCst);

    assert!((4..=6).contains(&beats), "{beats} heartbeats");
    assert!((4..=6).contains(&callbacks.load(Ordering::SeqCst)));
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn no_heartbeat_when_disabled() {
    let (client, mut broker) = connected(test_config()).await;
    let on_wire = Arc::new(AtomicUsize::new(0));

    {
        let on_wire = on_wire.clone();

        tokio::spawn(async move {
            while let Some(frame) = broker.recv_any().await {
                if let AMQPFrame::Heartbeat(_) = frame {
                    on_wire.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
    }

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(on_wire.load(Ordering::SeqCst), 0);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn failed_heartbeat_is_reported_once() {
    let (client_io, broker_io) = tokio::io::duplex(64 * 1024);
    let fail_writes = Arc::new(AtomicBool::new(false));
    let stream = FailingStream {
        inner: client_io,
        fail_writes: fail_writes.clone(),
    };
    let client = AsyncClient::new(Config {
        heartbeat: 2,
        ..test_config()
    });
    let records = record_failures(&client);
    let mut broker = FakeBroker::new(broker_io);

    let connecting = {
        let client = client.clone();

        tokio::spawn(async move { client.connect_stream(stream).await })
    };

    broker.handshake(2).await;
    connecting.await.unwrap().unwrap();

    fail_writes.store(true, Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(3)).await;
    wait_until(|| client.state() == ConnectionState::NotConnected).await;

    let records = records.lock().unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ErrorKind::Heartbeat);
    assert_eq!(records[0].code, 0);
    assert!(records[0].message.contains("heartbeat write failed"));
}
