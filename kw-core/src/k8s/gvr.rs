use std::fmt;

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

// GroupVersion and GVR are serialized in the same shape the apiserver uses for apiVersion strings:
// "group/version" (or just "version" for the core group), with the resource name appended for a
// GVR.  The resource name is the plural, lowercase name used in API paths (e.g. "configmaps"), not
// the kind; only the full tuple is unique, since e.g. "events" exists in both the core group and
// events.k8s.io.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct GroupVersion {
    pub group: String,
    pub version: String,
}

impl GroupVersion {
    pub fn new(group: &str, version: &str) -> GroupVersion {
        GroupVersion { group: group.into(), version: version.into() }
    }

    pub fn parse(value: &str) -> anyhow::Result<GroupVersion> {
        let parts: Vec<_> = value.split('/').collect();
        let (group, version) = match parts.len() {
            1 => ("", parts[0]),
            2 => (parts[0], parts[1]),
            _ => anyhow::bail!("invalid format for group version: {value}"),
        };
        if version.is_empty() {
            anyhow::bail!("missing version in group version: {value}");
        }
        Ok(GroupVersion::new(group, version))
    }

    pub fn is_core(&self) -> bool {
        self.group.is_empty()
    }

    pub fn api_version(&self) -> String {
        if self.is_core() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn with_resource(&self, resource: &str) -> GVR {
        GVR::new(&self.group, &self.version, resource)
    }
}

impl fmt::Display for GroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.api_version())
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct GVR {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GVR {
    pub fn new(group: &str, version: &str, resource: &str) -> GVR {
        GVR {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    pub fn group_version(&self) -> GroupVersion {
        GroupVersion::new(&self.group, &self.version)
    }

    pub fn api_version(&self) -> String {
        self.group_version().api_version()
    }

    // Discovery gives us the kind for each resource, which is what kube needs to build a dynamic
    // Api client.
    pub fn api_resource(&self, kind: &str) -> ApiResource {
        ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(&self.group, &self.version, kind), &self.resource)
    }
}

impl fmt::Display for GVR {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

impl Serialize for GroupVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{self}"))
    }
}

impl<'de> Deserialize<'de> for GroupVersion {
    fn deserialize<D>(deserializer: D) -> Result<GroupVersion, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        GroupVersion::parse(&value).map_err(de::Error::custom)
    }
}

impl Serialize for GVR {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{self}"))
    }
}

struct GVRVisitor;

impl<'de> de::Visitor<'de> for GVRVisitor {
    type Value = GVR;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a GroupVersionResource in the format group/version/resource")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let (gv, resource) = match value.rsplit_once('/') {
            Some((gv, resource)) if !resource.is_empty() => (gv, resource),
            _ => return Err(E::custom(format!("invalid format for gvr: {value}"))),
        };
        let gv = GroupVersion::parse(gv).map_err(|e| E::custom(format!("invalid format for gvr: {e}")))?;
        Ok(gv.with_resource(resource))
    }
}

impl<'de> Deserialize<'de> for GVR {
    fn deserialize<D>(deserializer: D) -> Result<GVR, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(GVRVisitor)
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
        assert_eq!(serde_json::to_string(&GVR::new("apps", "v1", "deployments")).unwrap(), "\"apps/v1/deployments\"");
        assert_eq!(serde_json::to_string(&GVR::new("", "v1", "configmaps")).unwrap(), "\"v1/configmaps\"");
        assert_eq!(serde_json::to_string(&GroupVersion::new("", "v1")).unwrap(), "\"v1\"");
    }

    #[rstest]
    fn test_deserialize() {
        let d1: StrDeserializer<SerdeError> = "apps/v1/deployments".into_deserializer();
        assert_eq!(GVR::deserialize(d1).unwrap(), GVR::new("apps", "v1", "deployments"));

        let d2: StrDeserializer<SerdeError> = "v1/configmaps".into_deserializer();
        assert_eq!(GVR::deserialize(d2).unwrap(), GVR::new("", "v1", "configmaps"));

        let d3: StrDeserializer<SerdeError> = "configmaps".into_deserializer();
        assert_err!(GVR::deserialize(d3));

        let d4: StrDeserializer<SerdeError> = "a/b/c/d".into_deserializer();
        assert_err!(GVR::deserialize(d4));
    }

    #[rstest]
    #[case::core("v1", GroupVersion::new("", "v1"))]
    #[case::group("apiextensions.k8s.io/v1", GroupVersion::new("apiextensions.k8s.io", "v1"))]
    fn test_parse_group_version(#[case] input: &str, #[case] expected: GroupVersion) {
        assert_eq!(GroupVersion::parse(input).unwrap(), expected);
        assert_eq!(expected.to_string(), input);
    }

    #[rstest]
    #[case::empty("")]
    #[case::no_version("apps/")]
    #[case::too_many("a/b/c")]
    fn test_parse_group_version_invalid(#[case] input: &str) {
        assert_err!(GroupVersion::parse(input));
    }

    #[rstest]
    fn test_gvr_ordering_distinguishes_groups() {
        let core_events = GVR::new("", "v1", "events");
        let events_k8s_io = GVR::new("events.k8s.io", "v1", "events");
        assert_ne!(core_events, events_k8s_io);
        assert_lt!(core_events, events_k8s_io);
    }

    #[rstest]
    fn test_api_resource() {
        let ar = GVR::new("apps", "v1", "deployments").api_resource("Deployment");
        assert_eq!(ar.api_version, "apps/v1");
        assert_eq!(ar.kind, "Deployment");
        assert_eq!(ar.plural, "deployments");
    }
}
