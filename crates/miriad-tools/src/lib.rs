// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod builtin;
mod dispatch;
mod ltm_tools;
mod present;
mod registry;
mod tool;

pub use builtin::{BashTool, EditFileTool, GlobTool, GrepTool, ReadFileTool, WriteFileTool};
pub use dispatch::{Dispatcher, INVALID_TOOL_NAME};
pub use ltm_tools::{
    LtmArchiveTool, LtmCreateTool, LtmListTool, LtmReadTool, LtmSearchTool, LtmUpdateTagsTool,
    LtmUpdateTool,
};
pub use present::{PresentSetMissionTool, PresentSetStatusTool, PresentUpdateTasksTool};
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{Tool, ToolCall, ToolOutput};

use std::sync::Arc;

use miriad_store::Storage;

/// Register the default tool set: file/shell tools, present-state tools, and
/// the LTM tools.  External tools (e.g. from an MCP client) are registered on
/// top through the same [`ToolRegistry`] seam.
pub fn default_registry(storage: Arc<Storage>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(BashTool::default());
    registry.register(ReadFileTool);
    registry.register(WriteFileTool);
    registry.register(EditFileTool);
    registry.register(GlobTool);
    registry.register(GrepTool);
    registry.register(PresentSetMissionTool::new(storage.clone()));
    registry.register(PresentSetStatusTool::new(storage.clone()));
    registry.register(PresentUpdateTasksTool::new(storage.clone()));
    registry.register(LtmCreateTool::new(storage.clone()));
    registry.register(LtmReadTool::new(storage.clone()));
    registry.register(LtmUpdateTool::new(storage.clone()));
    registry.register(LtmUpdateTagsTool::new(storage.clone()));
    registry.register(LtmArchiveTool::new(storage.clone()));
    registry.register(LtmListTool::new(storage.clone()));
    registry.register(LtmSearchTool::new(storage));
    registry
}
