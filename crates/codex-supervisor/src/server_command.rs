/// Commands from the liveness monitor to the lifecycle manager.
///
/// The monitor task never restarts the process itself; it reports and
/// exits, and the command handler runs the stop-then-start sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    /// Backend stopped answering health checks.
    ///
    /// `generation` identifies the launch the request belongs to; requests
    /// from before the last `start()`/`stop()` are discarded.
    Restart { reason: String, generation: u64 },
}
