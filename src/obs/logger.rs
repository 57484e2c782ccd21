// crates.io
use tracing::{
	Dispatch,
	dispatcher,
	instrument::{WithDispatch, WithSubscriber},
};
// self
use crate::_prelude::*;

/// Logger handed to components at construction time.
///
/// Wraps an optional [`Dispatch`]. When one is supplied every event emitted while a
/// component is handling a request goes to it; otherwise events go to whichever subscriber
/// is current on the calling thread, which is a no-op when the host installed none.
#[derive(Clone, Default)]
pub struct Logger(Option<Dispatch>);
impl Logger {
	/// Routes events to the provided dispatcher.
	pub fn new(dispatch: impl Into<Dispatch>) -> Self {
		Self(Some(dispatch.into()))
	}

	/// Discards every event.
	pub fn noop() -> Self {
		Self(Some(Dispatch::none()))
	}

	/// Uses the subscriber that is current where the work runs.
	pub fn ambient() -> Self {
		Self(None)
	}

	/// Binds `fut` to this logger's dispatcher for its whole lifetime.
	pub fn attach<Fut>(&self, fut: Fut) -> WithDispatch<Fut>
	where
		Fut: Future,
	{
		let dispatch = match &self.0 {
			Some(dispatch) => dispatch.clone(),
			None => dispatcher::get_default(Dispatch::clone),
		};

		fut.with_subscriber(dispatch)
	}
}
impl Debug for Logger {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let source = if self.0.is_some() { "injected" } else { "ambient" };

		f.debug_tuple("Logger").field(&source).finish()
	}
}
