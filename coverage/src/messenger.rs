/// Notifies the owner of a structure that its published state changed and should be picked up.
///
/// Background workers of the crate never touch the owner's state directly. They store their results and call
/// [`Messenger::request_update`], and the owner applies the results from its own thread.
pub trait Messenger: Send + Sync {
    /// Requests the owner to pick up updated state.
    fn request_update(&self);
}

/// Messenger that ignores all requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyMessenger;

impl Messenger for DummyMessenger {
    fn request_update(&self) {}
}

impl<F> Messenger for F
where
    F: Fn() + Send + Sync,
{
    fn request_update(&self) {
        self()
    }
}
