// Side effects a handled request asks the owner loop to perform.
// The handler only decides; the loop owns the settings and the controller.

use super::protocol::IpcResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcAction {
    /// Bring the primary's interface to the front
    ShowWindow,
    /// Read the handoff file and import the preset it names
    ImportHandoff,
}

pub struct IpcHandlerResult {
    pub response: IpcResponse,
    pub actions: Vec<IpcAction>,
}

impl IpcHandlerResult {
    pub fn response_only(response: IpcResponse) -> Self {
        Self {
            response,
            actions: Vec::new(),
        }
    }

    pub fn with_action(response: IpcResponse, action: IpcAction) -> Self {
        Self {
            response,
            actions: vec![action],
        }
    }
}
