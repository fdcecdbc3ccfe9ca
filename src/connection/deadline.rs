use async_io::Timer;
use futures::prelude::*;
use futures::task::AtomicWaker;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Instant;

/// Deadline of one direction of a connection. `None` means no deadline.
///
/// Changing the deadline wakes the operation currently waiting on it, so the new value applies
/// to pending I/O as well as future I/O.
pub(crate) struct Deadline {
    at: Mutex<Option<Instant>>,
    waker: AtomicWaker,
}

impl Deadline {
    pub fn new() -> Self {
        Self {
            at: Mutex::new(None),
            waker: AtomicWaker::new(),
        }
    }
    pub fn set(&self, at: Option<Instant>) {
        *self.at.lock().unwrap_or_else(PoisonError::into_inner) = at;
        self.waker.wake();
    }
    pub fn get(&self) -> Option<Instant> {
        *self.at.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn expiry(&self) -> Expiry<'_> {
        Expiry {
            deadline: self,
            timer: None,
        }
    }
}

/// Resolves once the current deadline has passed. Never resolves while there is no deadline.
pub(crate) struct Expiry<'a> {
    deadline: &'a Deadline,
    timer: Option<(Instant, Timer)>,
}

impl Future for Expiry<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.deadline.waker.register(cx.waker());
        let at = match this.deadline.get() {
            None => {
                this.timer = None;
                return Poll::Pending;
            }
            Some(at) => at,
        };
        if at <= Instant::now() {
            return Poll::Ready(());
        }
        match &mut this.timer {
            Some((armed, timer)) if *armed == at => Pin::new(timer).poll(cx).map(|_| ()),
            slot => {
                let mut timer = Timer::at(at);
                let p = Pin::new(&mut timer).poll(cx).map(|_| ());
                *slot = Some((at, timer));
                p
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::connection::deadline::Deadline;
    use futures::executor::block_on;
    use futures::future::{join, select, Either};
    use std::time::{Duration, Instant};

    #[test]
    fn past_deadline_expires_immediately() {
        let deadline = Deadline::new();
        deadline.set(Some(Instant::now()));
        block_on(deadline.expiry());
    }

    #[test]
    fn no_deadline_never_expires() {
        let deadline = Deadline::new();
        let result = block_on(select(
            deadline.expiry(),
            async_io::Timer::after(Duration::from_millis(20)),
        ));
        assert!(matches!(result, Either::Right(_)));
    }

    #[test]
    fn pending_expiry_sees_new_deadline() {
        let deadline = Deadline::new();
        let start = Instant::now();
        block_on(join(deadline.expiry(), async {
            async_io::Timer::after(Duration::from_millis(5)).await;
            deadline.set(Some(Instant::now() + Duration::from_millis(5)));
        }));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
