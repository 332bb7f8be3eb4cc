//! Role families.
//!
//! SOP authors and models name roles loosely ("input", "dropdown",
//! "textbox"), and the same control shows up under different AX roles across
//! UI revisions. A family is the set of roles and bare tags accepted for one
//! logical role. A role named outright is tried on its own first; the
//! family only widens the search when nothing carries that exact role.

use sopilot_core::element::UiElement;
use sopilot_core::plan::ActionType;

struct Family {
    name: &'static str,
    aliases: &'static [&'static str],
    roles: &'static [&'static str],
    /// Tags accepted when the element exposes no meaningful role
    tags: &'static [&'static str],
}

const FAMILIES: &[Family] = &[
    Family {
        name: "textbox",
        aliases: &["textbox", "input", "text", "textarea", "searchbox", "search", "field", "spinbutton"],
        roles: &["textbox", "searchbox", "combobox", "textarea", "spinbutton"],
        tags: &["INPUT", "TEXTAREA"],
    },
    Family {
        name: "combobox",
        aliases: &["combobox", "select", "dropdown", "listbox", "choice"],
        roles: &["combobox", "listbox", "select", "option"],
        tags: &["SELECT"],
    },
    Family {
        name: "button",
        aliases: &["button", "link", "a", "menuitem"],
        roles: &["button", "link", "menuitem"],
        tags: &["BUTTON", "A"],
    },
    Family {
        name: "checkbox",
        aliases: &["checkbox", "radio", "switch", "toggle"],
        roles: &["checkbox", "radio", "switch", "menuitemcheckbox"],
        tags: &[],
    },
    Family {
        name: "tab",
        aliases: &["tab"],
        roles: &["tab", "treeitem"],
        tags: &[],
    },
];

const ROLELESS: [&str; 4] = ["", "generic", "none", "presentation"];

const INTERACTIVE_ROLES: [&str; 12] = [
    "textbox", "searchbox", "combobox", "listbox", "button", "link", "menuitem", "checkbox",
    "radio", "switch", "tab", "treeitem",
];

/// The set of elements that satisfy one role constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum RoleConstraint {
    Family(&'static str),
    /// A role no family knows; matched exactly
    Exact(String),
    /// Any element a user can operate
    Interactive,
}

impl RoleConstraint {
    /// The constraint for a role name as written in an SOP or plan.
    pub fn for_role(role: &str) -> Self {
        let role = role.trim().to_ascii_lowercase();
        FAMILIES
            .iter()
            .find(|f| f.aliases.contains(&role.as_str()))
            .map(|f| RoleConstraint::Family(f.name))
            .unwrap_or(RoleConstraint::Exact(role))
    }

    /// The constraint an action implies when no role is given.
    ///
    /// Returns `None` for actions that do not operate on an element.
    pub fn implied_by(action: ActionType) -> Option<Self> {
        match action {
            ActionType::Fill => Some(RoleConstraint::Family("textbox")),
            ActionType::SelectOption => Some(RoleConstraint::Family("combobox")),
            ActionType::Click | ActionType::Focus | ActionType::Hover => Some(RoleConstraint::Interactive),
            ActionType::Scroll | ActionType::ExtractLlm | ActionType::SendMsgToUser => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RoleConstraint::Family(name) => name,
            RoleConstraint::Exact(role) => role,
            RoleConstraint::Interactive => "interactive",
        }
    }

    pub fn matches(&self, element: &UiElement) -> bool {
        let role = element.role.to_ascii_lowercase();
        match self {
            RoleConstraint::Family(name) => FAMILIES.iter().filter(|f| f.name == *name).any(|f| {
                f.roles.contains(&role.as_str())
                    || (ROLELESS.contains(&role.as_str())
                        && f.tags.contains(&element.tag.to_ascii_uppercase().as_str()))
            }),
            RoleConstraint::Exact(wanted) => role == *wanted,
            RoleConstraint::Interactive => {
                INTERACTIVE_ROLES.contains(&role.as_str()) || element.clickable || element.is_interactive_tag()
            }
        }
    }

    /// Whether `element` carries exactly `role`, or carries no role and a
    /// bare tag of this constraint's family.
    pub fn matches_exactly(&self, element: &UiElement, role: &str) -> bool {
        let element_role = element.role.to_ascii_lowercase();
        if element_role == role.trim().to_ascii_lowercase() {
            return true;
        }
        match self {
            RoleConstraint::Family(name) => {
                ROLELESS.contains(&element_role.as_str())
                    && FAMILIES
                        .iter()
                        .filter(|f| f.name == *name)
                        .any(|f| f.tags.contains(&element.tag.to_ascii_uppercase().as_str()))
            }
            _ => false,
        }
    }
}
