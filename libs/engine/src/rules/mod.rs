//! Built-in governance rules.
//!
//! Workflow-hygiene rules covering the supply-chain basics every
//! repository gets checked for. They double as reference implementations
//! of the rule contract; organization-specific rule packs register
//! alongside them.

pub mod org_policy;
pub mod workflow;

use crate::registry::RuleRegistry;
use oracle_common::Result;
use std::sync::Arc;

pub use org_policy::OrgExpectationsRule;
pub use workflow::{PrivilegedCheckoutRule, UnpinnedActionRule, WorkflowPermissionsRule};

/// Register the built-in rule set in declaration order.
pub fn register_builtin(registry: &mut RuleRegistry) -> Result<()> {
    registry.register(Arc::new(UnpinnedActionRule::new()))?;
    registry.register(Arc::new(WorkflowPermissionsRule::new()))?;
    registry.register(Arc::new(PrivilegedCheckoutRule::new()))?;
    registry.register(Arc::new(OrgExpectationsRule::new()))?;
    Ok(())
}
