//! Accumulating discovered devices across response datagrams
//!
//! One responder's answer is usually spread over several records, and
//! sometimes over several datagrams: a PTR names the instance, an SRV
//! names its port and target host, and an A or AAAA gives that host
//! an address. The registry stitches the chain together: devices are
//! keyed on instance name, and address records reach the instances
//! whose SRV points at their owner. First answer wins.

use crate::message::{RecordData, ResourceRecord};
use crate::Device;

/// The set of devices discovered so far, in order of first sighting
#[derive(Debug, Default)]
pub struct Registry {
    devices: Vec<Device>,
    // SRV target host of each device, empty until its SRV arrives
    targets: Vec<String>,
    // host addresses seen so far, whether or not anything points at
    // them yet
    hosts: Vec<(String, String)>,
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            targets: Vec::new(),
            hosts: Vec::new(),
        }
    }

    /// Fold one resource record into the device set
    ///
    /// A PTR record creates (or revisits) the device named by its
    /// target. An SRV record fills in the port of the device matching
    /// its owner name and links the device to its target host. An A
    /// or AAAA record supplies the address of every device whose
    /// chain ends at the record's owner, whether directly by name or
    /// through an SRV target; it never creates a device of its own.
    /// Fields already known are left alone, so replayed or duplicated
    /// records are harmless. Records with an empty name, and record
    /// types discovery does not use, are ignored.
    pub fn merge(&mut self, record: &ResourceRecord) {
        match &record.rdata {
            RecordData::Ptr(target) => {
                if !target.is_empty() {
                    self.upsert(target);
                }
            }
            RecordData::Srv { port, target, .. } => {
                if !record.owner.is_empty() {
                    let index = self.upsert(&record.owner);
                    if self.devices[index].port == 0 {
                        self.devices[index].port = *port;
                    }
                    if self.targets[index].is_empty() {
                        self.targets[index].clone_from(target);
                    }
                    if self.devices[index].address.is_empty() {
                        let target = &self.targets[index];
                        if let Some((_, address)) =
                            self.hosts.iter().find(|(h, _)| h == target)
                        {
                            self.devices[index].address = address.clone();
                        }
                    }
                }
            }
            RecordData::A(address) => {
                self.learn_address(&record.owner, address.to_string());
            }
            RecordData::Aaaa(address) => {
                self.learn_address(&record.owner, address.to_string());
            }
            RecordData::Other(_) => {}
        }
    }

    fn upsert(&mut self, name: &str) -> usize {
        match self.devices.iter().position(|d| d.name == name) {
            Some(index) => index,
            None => {
                // an address record for this name may already be on
                // file
                let address = self
                    .hosts
                    .iter()
                    .find(|(h, _)| h == name)
                    .map(|(_, a)| a.clone())
                    .unwrap_or_default();
                self.devices.push(Device {
                    name: name.to_string(),
                    address,
                    port: 0,
                });
                self.targets.push(String::new());
                self.devices.len() - 1
            }
        }
    }

    fn learn_address(&mut self, host: &str, address: String) {
        if host.is_empty() {
            return;
        }
        let known = self
            .hosts
            .iter()
            .find(|(h, _)| h == host)
            .map(|(_, a)| a.clone());
        let address = match known {
            Some(first) => first,
            None => {
                self.hosts.push((host.to_string(), address.clone()));
                address
            }
        };
        for (device, target) in self.devices.iter_mut().zip(&self.targets) {
            if device.address.is_empty()
                && (device.name == host || target == host)
            {
                device.address.clone_from(&address);
            }
        }
    }

    /// How many devices have been seen so far
    #[must_use]
    pub fn count(&self) -> usize {
        self.devices.len()
    }

    /// The device at `index`, or None once past the end
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn ptr(owner: &str, target: &str) -> ResourceRecord {
        ResourceRecord {
            owner: owner.to_string(),
            rdata: RecordData::Ptr(target.to_string()),
        }
    }

    fn srv(owner: &str, port: u16, target: &str) -> ResourceRecord {
        ResourceRecord {
            owner: owner.to_string(),
            rdata: RecordData::Srv {
                priority: 0,
                weight: 0,
                port,
                target: target.to_string(),
            },
        }
    }

    fn a(owner: &str, address: Ipv4Addr) -> ResourceRecord {
        ResourceRecord {
            owner: owner.to_string(),
            rdata: RecordData::A(address),
        }
    }

    fn aaaa(owner: &str, address: Ipv6Addr) -> ResourceRecord {
        ResourceRecord {
            owner: owner.to_string(),
            rdata: RecordData::Aaaa(address),
        }
    }

    #[test]
    fn starts_empty() {
        let registry = Registry::new();
        assert_eq!(registry.count(), 0);
        assert!(registry.get(0).is_none());
    }

    #[test]
    fn assembles_device_from_record_chain() {
        // The realistic shape: the A record belongs to the SRV target
        // host, not to the instance.
        let mut registry = Registry::new();
        registry.merge(&ptr("_http._tcp.local", "Fnord._http._tcp.local"));
        registry.merge(&srv("Fnord._http._tcp.local", 8080, "fnord.local"));
        registry.merge(&a("fnord.local", Ipv4Addr::new(192, 168, 1, 37)));
        assert_eq!(registry.count(), 1);
        let device = registry.get(0).unwrap();
        assert_eq!(device.name, "Fnord._http._tcp.local");
        assert_eq!(device.address, "192.168.1.37");
        assert_eq!(device.port, 8080);
    }

    #[test]
    fn address_arrives_before_srv() {
        let mut registry = Registry::new();
        registry.merge(&a("fnord.local", Ipv4Addr::new(192, 168, 1, 37)));
        registry.merge(&ptr("_http._tcp.local", "Fnord._http._tcp.local"));
        registry.merge(&srv("Fnord._http._tcp.local", 8080, "fnord.local"));
        assert_eq!(registry.count(), 1);
        let device = registry.get(0).unwrap();
        assert_eq!(device.address, "192.168.1.37");
        assert_eq!(device.port, 8080);
    }

    #[test]
    fn host_records_do_not_create_devices() {
        let mut registry = Registry::new();
        registry.merge(&a("fnord.local", Ipv4Addr::new(10, 0, 0, 1)));
        registry.merge(&aaaa(
            "fnord.local",
            Ipv6Addr::new(0xFE80, 0, 0, 0, 0, 0, 0, 0x37),
        ));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn srv_before_ptr_is_equivalent() {
        let mut registry = Registry::new();
        registry.merge(&srv("Fnord._http._tcp.local", 8080, "fnord.local"));
        registry.merge(&ptr("_http._tcp.local", "Fnord._http._tcp.local"));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get(0).unwrap().port, 8080);
    }

    #[test]
    fn first_answer_wins() {
        let mut registry = Registry::new();
        registry.merge(&srv("Fnord._http._tcp.local", 8080, "fnord.local"));
        registry.merge(&srv("Fnord._http._tcp.local", 9090, "fnord.local"));
        registry.merge(&a("fnord.local", Ipv4Addr::new(10, 0, 0, 1)));
        registry.merge(&a("fnord.local", Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(registry.count(), 1);
        let device = registry.get(0).unwrap();
        assert_eq!(device.port, 8080);
        assert_eq!(device.address, "10.0.0.1");
    }

    #[test]
    fn replayed_records_are_harmless() {
        let mut registry = Registry::new();
        for _ in 0..3 {
            registry.merge(&ptr(
                "_http._tcp.local",
                "Fnord._http._tcp.local",
            ));
            registry.merge(&srv(
                "Fnord._http._tcp.local",
                8080,
                "fnord.local",
            ));
            registry.merge(&a("fnord.local", Ipv4Addr::new(10, 0, 0, 1)));
        }
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn keeps_devices_in_order_of_first_sighting() {
        let mut registry = Registry::new();
        registry.merge(&ptr("_http._tcp.local", "prod37._http._tcp.local"));
        registry.merge(&ptr("_http._tcp.local", "prod38._http._tcp.local"));
        registry.merge(&srv("prod37._http._tcp.local", 80, "prod37.local"));
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.get(0).unwrap().name, "prod37._http._tcp.local");
        assert_eq!(registry.get(1).unwrap().name, "prod38._http._tcp.local");
        assert!(registry.get(2).is_none());
    }

    #[test]
    fn two_instances_share_one_host() {
        let mut registry = Registry::new();
        registry.merge(&ptr("_http._tcp.local", "prod37._http._tcp.local"));
        registry.merge(&ptr("_http._tcp.local", "prod38._http._tcp.local"));
        registry.merge(&srv("prod37._http._tcp.local", 80, "web.local"));
        registry.merge(&srv("prod38._http._tcp.local", 81, "web.local"));
        registry.merge(&a("web.local", Ipv4Addr::new(10, 0, 0, 9)));
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.get(0).unwrap().address, "10.0.0.9");
        assert_eq!(registry.get(0).unwrap().port, 80);
        assert_eq!(registry.get(1).unwrap().address, "10.0.0.9");
        assert_eq!(registry.get(1).unwrap().port, 81);
    }

    #[test]
    fn takes_ipv6_address_if_first() {
        let mut registry = Registry::new();
        registry.merge(&srv("Fnord._http._tcp.local", 8080, "fnord.local"));
        registry.merge(&aaaa(
            "fnord.local",
            Ipv6Addr::new(0xFE80, 0, 0, 0, 0, 0, 0, 0x37),
        ));
        registry.merge(&a("fnord.local", Ipv4Addr::new(10, 0, 0, 1)));
        let device = registry.get(0).unwrap();
        assert_eq!(device.address, "fe80::37");
    }

    #[test]
    fn ignores_empty_names() {
        let mut registry = Registry::new();
        registry.merge(&ptr("_http._tcp.local", ""));
        registry.merge(&srv("", 8080, "fnord.local"));
        registry.merge(&a("", Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn ignores_other_record_types() {
        let mut registry = Registry::new();
        registry.merge(&ResourceRecord {
            owner: "fnord.local".to_string(),
            rdata: RecordData::Other(16),
        });
        assert_eq!(registry.count(), 0);
    }
}
