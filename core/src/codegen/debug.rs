//! file: core/src/codegen/debug.rs
//! description: optional source-location metadata.

use super::CodeGen;
use crate::ir::{DebugInfo, FuncId, Subprogram};
use crate::location::Location;
use crate::program::Node;

impl<'p> CodeGen<'p> {
    pub(super) fn init_debug_info(&mut self) {
        let file = self
            .options
            .filename
            .clone()
            .or_else(|| self.program.filename.clone())
            .unwrap_or_else(|| "main".to_string());
        self.b.module.debug = Some(DebugInfo { file, producer: "basalt".to_string(), subprograms: Vec::new() });
    }

    pub(super) fn debug_subprogram(&mut self, name: &str, function: FuncId, line: usize) {
        if let Some(debug) = self.b.module.debug.as_mut() {
            debug.subprograms.push(Subprogram { name: name.to_string(), function, line });
        }
    }

    /// Attach `node`'s location to instructions emitted while visiting it.
    /// Returns the location to restore afterwards.
    pub(super) fn enter_location(&mut self, node: &Node) -> Option<Option<Location>> {
        if !self.options.debug_info {
            return None;
        }
        let saved = self.b.location().cloned();
        if let Some(loc) = node.location.as_ref().filter(|l| l.is_known()) {
            self.b.set_location(Some(loc.clone()));
        }
        Some(saved)
    }

    pub(super) fn leave_location(&mut self, saved: Option<Option<Location>>) {
        if let Some(loc) = saved {
            self.b.set_location(loc);
        }
    }
}
