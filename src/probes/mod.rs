//! Built-in detection probes.
//!
//! Each probe only inspects the local system and returns evidence; none of
//! them keeps state between cycles. [`DESCRIPTORS`] is the registration
//! order, which is also the order findings appear in a report.

pub mod anomaly;
pub mod behavior;
pub mod file;
pub mod network;
pub mod package;
pub mod persistence;
pub mod process;
pub mod root;
pub mod walk;

use crate::detection::probe::ProbeDescriptor;

pub const DESCRIPTORS: &[ProbeDescriptor] = &[
    ProbeDescriptor { name: "process",     build: process::ProcessProbe::build },
    ProbeDescriptor { name: "network",     build: network::NetworkProbe::build },
    ProbeDescriptor { name: "file",        build: file::FileProbe::build },
    ProbeDescriptor { name: "persistence", build: persistence::PersistenceProbe::build },
    ProbeDescriptor { name: "root",        build: root::RootProbe::build },
    ProbeDescriptor { name: "behavior",    build: behavior::BehaviorProbe::build },
    ProbeDescriptor { name: "anomaly",     build: anomaly::AnomalyProbe::build },
    ProbeDescriptor { name: "package",     build: package::PackageProbe::build },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ProbesConfig;
    use crate::detection::probe::ProbeRegistry;

    #[test]
    fn default_config_registers_all_but_package() {
        let reg = ProbeRegistry::build(DESCRIPTORS, &ProbesConfig::default());
        assert_eq!(
            reg.names(),
            vec!["process", "network", "file", "persistence", "root", "behavior", "anomaly"]
        );
    }

    #[test]
    fn enabled_list_filters_and_keeps_order() {
        let cfg = ProbesConfig { enabled: vec!["ROOT".into(), "process".into()], ..Default::default() };
        let reg = ProbeRegistry::build(DESCRIPTORS, &cfg);
        assert_eq!(reg.names(), vec!["process", "root"]);
    }
}
