use {
	core::{
		pin::Pin,
		task::{Context, Poll},
	},
	futures::{Stream, StreamExt, stream::FuturesUnordered},
};

/// A queue of in-flight asynchronous side work.
///
/// Worker loops enqueue futures they must not block on (outbound RPCs,
/// deferred cleanup) and drive them from one arm of their `select!` loop.
///
/// An empty queue is pending rather than terminated, so it can sit in a
/// `select!` arm permanently. It registers no waker while empty; it must be
/// polled again by the loop that enqueues into it, which is the only intended
/// usage.
pub(crate) struct WorkQueue(
	FuturesUnordered<Pin<Box<dyn Future<Output = ()> + Send + 'static>>>,
);

impl WorkQueue {
	pub fn new() -> Self {
		Self(FuturesUnordered::new())
	}

	/// Adds a future to the queue. It starts executing on the next poll.
	pub fn enqueue<F>(&mut self, fut: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		self.0.push(Box::pin(fut));
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.0.len()
	}
}

impl Stream for WorkQueue {
	type Item = ();

	fn poll_next(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
	) -> Poll<Option<Self::Item>> {
		match self.0.poll_next_unpin(cx) {
			Poll::Ready(None) => Poll::Pending,
			other => other,
		}
	}
}
