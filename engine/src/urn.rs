use std::{
    convert::Infallible,
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// Identifies one resource within one stack.
///
/// Shape: `urn:pulumi:<stack>::<project>::<qualified type>::<name>`, where the
/// qualified type chains parent types with `$`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceUrn(String);

impl ResourceUrn {
    pub fn new(urn: impl Into<String>) -> Self {
        Self(urn.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> Option<[&str; 4]> {
        let mut parts = self.0.splitn(4, "::");
        let head = parts.next()?;
        let project = parts.next()?;
        let qualified_type = parts.next()?;
        let name = parts.next()?;
        Some([head, project, qualified_type, name])
    }

    /// The stack segment of the urn, if well formed.
    pub fn stack(&self) -> Option<&str> {
        let [head, ..] = self.segments()?;
        head.strip_prefix("urn:pulumi:")
    }

    pub fn project(&self) -> Option<&str> {
        self.segments().map(|[_, project, _, _]| project)
    }

    /// The resource's own type, without parent type qualifiers.
    pub fn resource_type(&self) -> Option<&str> {
        let [_, _, qualified_type, _] = self.segments()?;
        qualified_type.rsplit('$').next()
    }

    pub fn name(&self) -> Option<&str> {
        self.segments().map(|[_, _, _, name]| name)
    }
}

impl Display for ResourceUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ResourceUrn {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ResourceUrn {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl FromStr for ResourceUrn {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for ResourceUrn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urn_segments() {
        let urn = ResourceUrn::new("urn:pulumi:dev::shop::aws:s3/bucket:Bucket::assets");
        assert_eq!(urn.stack(), Some("dev"));
        assert_eq!(urn.project(), Some("shop"));
        assert_eq!(urn.resource_type(), Some("aws:s3/bucket:Bucket"));
        assert_eq!(urn.name(), Some("assets"));
    }

    #[test]
    fn test_urn_parent_qualified_type() {
        let urn = ResourceUrn::new(
            "urn:pulumi:dev::shop::my:web:Site$aws:lambda/function:Function::handler",
        );
        assert_eq!(urn.resource_type(), Some("aws:lambda/function:Function"));
        assert_eq!(urn.name(), Some("handler"));
    }

    #[test]
    fn test_urn_malformed() {
        let urn = ResourceUrn::new("not-a-urn");
        assert_eq!(urn.name(), None);
        assert_eq!(urn.resource_type(), None);
        assert!(!urn.is_empty());
        assert!(ResourceUrn::default().is_empty());
    }
}
