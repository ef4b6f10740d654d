use crate::delta::UserCmd;
use crate::net::protocol::Resource;

/// Game-side capabilities injected into the client at construction.
pub trait ClientHooks {
    /// Fills in this tick's movement intent.
    fn think(&mut self, _cmd: &mut UserCmd) {}

    /// Forces a download the client would otherwise skip.
    fn is_resource_required(&mut self, _resource: &Resource) -> bool {
        false
    }

    /// Runs a server-issued console command locally. Returning `false`
    /// forwards it back to the server.
    fn execute(&mut self, _command: &str) -> bool {
        false
    }
}

/// Hooks that do nothing; every server command is forwarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl ClientHooks for NoHooks {}
