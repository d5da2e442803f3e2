// Entity schema definitions - the JSON configuration surface of the runtime

pub mod attribute;
pub mod entity;

pub use attribute::{AttributeKind, AttributeSpec, HashAlgorithm, HashSpec, SlugAffix};
pub use entity::{
    Comparator, Condition, EntityConfig, Hook, HookAction, IndexSpec, JoinSpec, JoinType,
    Lifecycle,
};

/// Entity that backs `user` attributes and `user.*` variables
pub const USERS_ENTITY: &str = "users";

/// Singular form of an entity name, or `None` when it is already singular.
pub fn singularize(name: &str) -> Option<String> {
    let lower = name.to_lowercase();
    if lower.ends_with("ies") && name.len() > 3 {
        return Some(format!("{}y", &name[..name.len() - 3]));
    }
    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if lower.ends_with(suffix) {
            return Some(name[..name.len() - 2].to_string());
        }
    }
    if lower.ends_with('s') && !lower.ends_with("ss") && !lower.ends_with("us") && name.len() > 1 {
        return Some(name[..name.len() - 1].to_string());
    }
    None
}
