use crate::runtime::blueprint::NodeIndex;

/// Lets a node steer its token through the engine.
pub trait Syscall: Send + Sync {
    /// Continue with the given node.
    fn jump(&mut self, target: NodeIndex);

    /// Suspend the token until a later event re-enters the node.
    fn wait(&mut self);

    /// End the current token.
    fn terminate(&mut self);
}
