//! Heartbeat tick source for the connection engine.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio_stream::wrappers::IntervalStream;

pin_project! {
    /// A stream that ticks at half the negotiated heartbeat interval, or
    /// never when heartbeats are disabled.
    #[derive(Debug)]
    pub(crate) struct Heartbeat {
        #[pin]
        interval: Option<IntervalStream>,
    }
}

impl Heartbeat {
    /// A heartbeat source that never ticks.
    pub(crate) fn never() -> Self {
        Self { interval: None }
    }

    /// Ticks every `interval / 2` so a probe can be sent before the peer's
    /// deadline passes.
    pub(crate) fn new(interval: Duration) -> Self {
        let period = interval / 2;
        Self {
            interval: Some(IntervalStream::new(tokio::time::interval(period))),
        }
    }
}

impl Stream for Heartbeat {
    type Item = ();

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.project().interval.as_pin_mut() {
            Some(interval) => match interval.poll_next(cx) {
                Poll::Ready(Some(_instant)) => Poll::Ready(Some(())),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn ticks_at_half_the_interval() {
        let mut heartbeat = Heartbeat::new(Duration::from_secs(60));
        let start = tokio::time::Instant::now();
        heartbeat.next().await;
        heartbeat.next().await;
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_heartbeat_never_ticks() {
        let mut heartbeat = Heartbeat::never();
        tokio::select! {
            _ = heartbeat.next() => panic!("a disabled heartbeat ticked"),
            _ = tokio::time::sleep(Duration::from_secs(3600)) => {}
        }
    }
}
