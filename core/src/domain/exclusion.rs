/// Addresses the VPN router must leave alone.
///
/// Keeps first-seen order and drops duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionList {
    addresses: Vec<String>,
}

impl ExclusionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, address: impl Into<String>) {
        let address = address.into();
        if !address.is_empty() && !self.addresses.contains(&address) {
            self.addresses.push(address);
        }
    }

    pub fn extend<I, S>(&mut self, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for address in addresses {
            self.add(address);
        }
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// `-x <addr>` for every address.
    pub fn router_args(&self) -> Vec<String> {
        self.addresses
            .iter()
            .flat_map(|address| ["-x".to_string(), address.clone()])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_order() {
        let mut list = ExclusionList::new();
        list.extend(["10.0.0.0/8", "127.0.0.1", "10.0.0.0/8"]);
        list.add("172.17.0.2");
        list.add("127.0.0.1");
        list.add("");

        assert_eq!(list.addresses(), ["10.0.0.0/8", "127.0.0.1", "172.17.0.2"]);
        assert_eq!(
            list.router_args(),
            ["-x", "10.0.0.0/8", "-x", "127.0.0.1", "-x", "172.17.0.2"]
        );
    }
}
