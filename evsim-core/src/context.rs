//! ## evsim-core::context
//! **Execution-context identifiers**
//!
//! Every event carries the id of the logical entity (usually a node) it runs on
//! behalf of. While a callback executes, that id is the simulator's *current
//! context*, so anything the callback schedules inherits it by default.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque 32-bit context id. [`ContextId::NONE`] means "no context".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(u32);

impl ContextId {
    pub const NONE: ContextId = ContextId(u32::MAX);

    pub const fn new(id: u32) -> Self {
        ContextId(id)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for ContextId {
    fn default() -> Self {
        ContextId::NONE
    }
}

impl From<u32> for ContextId {
    fn from(id: u32) -> Self {
        ContextId(id)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Holds the current context of a simulator.
#[derive(Debug, Default)]
pub(crate) struct ContextRegister {
    current: Cell<ContextId>,
}

impl ContextRegister {
    pub(crate) fn current(&self) -> ContextId {
        self.current.get()
    }

    pub(crate) fn reset(&self) {
        self.current.set(ContextId::NONE);
    }

    /// Switches to `ctx` until the returned guard is dropped, including on unwind.
    pub(crate) fn enter(&self, ctx: ContextId) -> ContextGuard<'_> {
        let previous = self.current.replace(ctx);
        ContextGuard {
            register: self,
            previous,
        }
    }
}

#[must_use = "the context reverts as soon as the guard is dropped"]
pub(crate) struct ContextGuard<'a> {
    register: &'a ContextRegister,
    previous: ContextId,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.register.current.set(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_the_default() {
        assert!(ContextId::default().is_none());
        assert!(!ContextId::new(0).is_none());
        assert_eq!(ContextId::NONE.to_string(), "none");
        assert_eq!(ContextId::new(7).to_string(), "7");
    }

    #[test]
    fn guards_nest_and_restore() {
        let reg = ContextRegister::default();
        {
            let _outer = reg.enter(ContextId::new(1));
            assert_eq!(reg.current(), ContextId::new(1));
            {
                let _inner = reg.enter(ContextId::new(2));
                assert_eq!(reg.current(), ContextId::new(2));
            }
            assert_eq!(reg.current(), ContextId::new(1));
        }
        assert_eq!(reg.current(), ContextId::NONE);
    }

    #[test]
    fn guard_restores_on_unwind() {
        let reg = ContextRegister::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g = reg.enter(ContextId::new(9));
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(reg.current(), ContextId::NONE);
    }
}
