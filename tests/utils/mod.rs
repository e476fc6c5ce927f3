#![allow(unused)]

mod tracing;

pub use {recorder::*, time::*};

use {
	anyhow::Result,
	roster::{Node, builtin::Mesh},
};

/// Builds one node per name on the mesh, each running the given scope.
pub fn cluster<const N: usize>(
	mesh: &Mesh,
	scope: &str,
	names: [&str; N],
) -> Result<[Node; N]> {
	let mut nodes = Vec::with_capacity(N);
	for name in names {
		nodes.push(
			Node::builder()
				.with_transport(mesh.endpoint(name))
				.with_scope(scope)
				.build()?,
		);
	}
	Ok(nodes.try_into().expect("one node per name"))
}

/// Polls a condition until it holds or a scaled deadline passes.
pub async fn eventually(
	what: &str,
	check: impl Fn() -> bool,
) -> Result<()> {
	let deadline = tokio::time::Instant::now() + secs(5);
	loop {
		if check() {
			return Ok(());
		}
		if tokio::time::Instant::now() > deadline {
			anyhow::bail!("condition not reached in time: {what}");
		}
		tokio::time::sleep(millis(10)).await;
	}
}

/// Asserts that a condition keeps NOT holding for a short observation
/// window; used to show that suppressed effects really are suppressed.
pub async fn never(what: &str, check: impl Fn() -> bool) -> Result<()> {
	let deadline = tokio::time::Instant::now() + millis(200);
	while tokio::time::Instant::now() < deadline {
		if check() {
			anyhow::bail!("condition unexpectedly reached: {what}");
		}
		tokio::time::sleep(millis(10)).await;
	}
	Ok(())
}
