use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

use kube::api::{
    ApiResource,
    GroupVersionKind,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
    de,
};

// GVK is a "newtype" wrapper around kube's GroupVersionKind so that resource declarations in
// config files can name the kind to watch as a single string.
//
// The string format is "group/version.kind", or just "version.kind" for the core group; we also
// accept "/version.kind" when deserializing.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct GVK(GroupVersionKind);

impl GVK {
    pub fn new(group: &str, version: &str, kind: &str) -> GVK {
        GVK(GroupVersionKind::gvk(group, version, kind))
    }

    // The plural is the resource name the apiserver routes on (e.g. "deployments"); we always
    // know it from the resource declaration, so there is no need for a discovery round-trip.
    pub fn api_resource(&self, plural: &str) -> ApiResource {
        ApiResource::from_gvk_with_plural(&self.0, plural)
    }

    pub fn group_opt(&self) -> Option<&str> {
        if self.0.group.is_empty() { None } else { Some(&self.0.group) }
    }
}

// Impl Deref lets a GVK act like a GroupVersionKind anywhere one of those is expected
impl Deref for GVK {
    type Target = GroupVersionKind;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for GVK {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut group = Cow::from(&self.0.group);
        if !group.is_empty() {
            group.to_mut().push('/');
        }

        write!(f, "{group}{}.{}", self.0.version, self.0.kind)
    }
}

impl Serialize for GVK {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{self}"))
    }
}

struct GVKVisitor;

impl<'de> de::Visitor<'de> for GVKVisitor {
    type Value = GVK;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a GroupVersionKind in the format group/version.kind")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let p1: Vec<_> = value.split('/').collect();
        let (group, rest) = match p1.len() {
            2 => (p1[0], p1[1]),
            1 => ("", p1[0]),
            _ => return Err(E::custom(format!("invalid format for gvk: {value}"))),
        };
        let p2: Vec<_> = rest.split('.').collect();
        let (version, kind) = match p2.len() {
            2 => (p2[0], p2[1]),
            _ => return Err(E::custom(format!("invalid format for gvk: {value}"))),
        };

        Ok(GVK(GroupVersionKind::gvk(group, version, kind)))
    }
}

impl<'de> Deserialize<'de> for GVK {
    fn deserialize<D>(deserializer: D) -> Result<GVK, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(GVKVisitor)
    }
}

#[cfg(test)]
mod test {
    use assertables::*;
    use rstest::*;
    use serde::de::IntoDeserializer;
    use serde::de::value::{
        Error as SerdeError,
        StrDeserializer,
    };

    use super::*;

    #[rstest]
    fn test_serialize() {
        assert_eq!(serde_json::to_string(&GVK::new("apps", "v1", "Deployment")).unwrap(), "\"apps/v1.Deployment\"");
        assert_eq!(serde_json::to_string(&GVK::new("", "v1", "Pod")).unwrap(), "\"v1.Pod\"");
    }

    #[rstest]
    fn test_deserialize() {
        let d1: StrDeserializer<SerdeError> = "batch/v1.Job".into_deserializer();
        assert_eq!(GVK::deserialize(d1).unwrap(), GVK::new("batch", "v1", "Job"));

        let d2: StrDeserializer<SerdeError> = "/v1.Node".into_deserializer();
        assert_eq!(GVK::deserialize(d2).unwrap(), GVK::new("", "v1", "Node"));

        let d3: StrDeserializer<SerdeError> = "v1.Node".into_deserializer();
        assert_eq!(GVK::deserialize(d3).unwrap(), GVK::new("", "v1", "Node"));

        let d4: StrDeserializer<SerdeError> = "asdf".into_deserializer();
        assert_err!(GVK::deserialize(d4));

        let d5: StrDeserializer<SerdeError> = "foo/asdf/asdf".into_deserializer();
        assert_err!(GVK::deserialize(d5));
    }

    #[rstest]
    #[case::core(GVK::new("", "v1", "Pod"), "pods", "v1", None)]
    #[case::grouped(GVK::new("apps", "v1", "Deployment"), "deployments", "apps/v1", Some("apps"))]
    fn test_api_resource(
        #[case] gvk: GVK,
        #[case] plural: &str,
        #[case] api_version: &str,
        #[case] group: Option<&str>,
    ) {
        let ar = gvk.api_resource(plural);
        assert_eq!(ar.plural, plural);
        assert_eq!(ar.api_version, api_version);
        assert_eq!(gvk.group_opt(), group);
    }
}
