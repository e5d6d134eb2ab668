//! Authority gate: is this process the source of truth?

use crate::transport::Transport;

/// The local process's role in the replication topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetRole {
    /// Source of truth; applies changes and fans them out.
    Authority,
    /// Receives fan-out; forwards its own requests to the authority.
    Observer,
}

/// Answers "am I the authority?" from the transport's view of the local role.
///
/// A pure predicate over a borrowed transport; it holds no state of its own.
pub struct AuthorityGate<'a, T: ?Sized> {
    transport: &'a T,
}

impl<'a, T: Transport + ?Sized> AuthorityGate<'a, T> {
    /// Creates a gate over `transport`.
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Whether the local process is the authority right now.
    pub fn is_authority(&self) -> bool {
        self.transport.is_local_process_authority()
    }

    /// The local role right now.
    pub fn role(&self) -> NetRole {
        if self.is_authority() {
            NetRole::Authority
        } else {
            NetRole::Observer
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::request::StateChangeRequest;
    use crate::transport::TransportError;

    struct RoleOnly(Cell<bool>);

    impl Transport for RoleOnly {
        fn send_to_authority(&self, _: &StateChangeRequest) -> Result<(), TransportError> {
            Ok(())
        }
        fn broadcast(&self, _: &StateChangeRequest) -> Result<(), TransportError> {
            Ok(())
        }
        fn is_local_process_authority(&self) -> bool {
            self.0.get()
        }
    }

    #[test]
    fn test_gate_reflects_current_role() {
        let transport = RoleOnly(Cell::new(true));
        let gate = AuthorityGate::new(&transport);
        assert!(gate.is_authority());
        assert_eq!(gate.role(), NetRole::Authority);

        transport.0.set(false);
        assert!(!gate.is_authority());
        assert_eq!(gate.role(), NetRole::Observer);
    }
}
