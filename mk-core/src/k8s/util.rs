use kube::Resource;
use kube::ResourceExt;

pub trait KubeResourceExt {
    fn namespaced_name(&self) -> String;
}

impl<T: Resource> KubeResourceExt for T {
    fn namespaced_name(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}/{}", ns, self.name_any()),
            None => self.name_any(),
        }
    }
}

#[cfg(test)]
mod tests {
    use kube::api::{
        ApiResource,
        DynamicObject,
    };
    use rstest::*;

    use super::*;
    use crate::constants::*;

    #[rstest]
    #[case::namespaced(Some("kube-system"), "kube-system/coredns")]
    #[case::cluster_scoped(None, "coredns")]
    fn test_namespaced_name(#[case] ns: Option<&str>, #[case] expected: &str) {
        let mut obj = DynamicObject::new("coredns", &ApiResource::from_gvk(&DEPLOYMENT_GVK));
        if let Some(ns) = ns {
            obj = obj.within(ns);
        }
        assert_eq!(obj.namespaced_name(), expected);
    }
}
