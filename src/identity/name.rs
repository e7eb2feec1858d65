//! Hierarchical container-scoped component name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Application/module/component triple naming an installed component within
/// the container. Immutable; used as a registry key everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentName {
    pub application: String,
    pub module: String,
    pub component: String,
}

impl ComponentName {
    pub fn new(
        application: impl Into<String>,
        module: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            application: application.into(),
            module: module.into(),
            component: component.into(),
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.application, self.module, self.component)
    }
}

impl std::str::FromStr for ComponentName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(app), Some(module), Some(component))
                if !app.is_empty() && !module.is_empty() && !component.is_empty() =>
            {
                Ok(Self::new(app, module, component))
            }
            _ => Err(format!("invalid component name: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trip() {
        let name = ComponentName::new("app", "mod", "Comp");
        assert_eq!(name.to_string(), "app/mod/Comp");
        assert_eq!("app/mod/Comp".parse::<ComponentName>().unwrap(), name);
    }

    #[test]
    fn test_rejects_incomplete_names() {
        assert!("app/mod".parse::<ComponentName>().is_err());
        assert!("app//Comp".parse::<ComponentName>().is_err());
        assert!("".parse::<ComponentName>().is_err());
    }

    #[test]
    fn test_component_part_may_contain_slashes() {
        let name = "app/mod/sub/Comp".parse::<ComponentName>().unwrap();
        assert_eq!(name.component, "sub/Comp");
    }
}
