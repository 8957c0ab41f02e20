use dashmap::DashSet;

/// Namespaces this end of a connection advertises via service discovery.
#[derive(Debug, Default)]
pub struct FeatureSet {
    features: DashSet<String>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self {
            features: DashSet::new(),
        }
    }

    /// Returns false if the feature was already advertised.
    pub fn add_feature(&self, namespace: &str) -> bool {
        self.features.insert(namespace.to_string())
    }

    pub fn includes(&self, namespace: &str) -> bool {
        self.features.contains(namespace)
    }

    /// Sorted snapshot, for disco#info replies.
    pub fn features(&self) -> Vec<String> {
        let mut out: Vec<String> = self.features.iter().map(|f| f.key().clone()).collect();
        out.sort();
        out
    }
}
