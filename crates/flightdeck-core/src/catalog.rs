//! Static catalogs of accepted launch values

/// Master node sizes understood by the cluster templates
pub const MASTER_INSTANCE_TYPES: &[&str] = &[
    "small-t2.large",
    "medium-r3.2xlarge",
    "large-c4.8xlarge",
    "gpu-g2.2xlarge",
    "enterprise-x1.32xlarge",
];

/// Compute node sizes understood by the compute-group templates
pub const COMPUTE_INSTANCE_TYPES: &[&str] = &[
    "compute-2C-3.75GB.small-c4.large",
    "compute-8C-15GB.medium-c4.2xlarge",
    "compute-16C-30GB.large-c4.4xlarge",
    "compute-36C-60GB.dedicated-c4.8xlarge",
    "balanced-4C-16GB.small-m4.xlarge",
    "balanced-8C-32GB.medium-m4.2xlarge",
    "balanced-16C-64GB.large-m4.4xlarge",
    "balanced-40C-160GB.dedicated-m4.10xlarge",
    "memory-4C-30GB.small-r3.xlarge",
    "memory-8C-60GB.medium-r3.2xlarge",
    "memory-16C-120GB.large-r3.4xlarge",
    "memory-32C-240GB.dedicated-r3.8xlarge",
    "gpu-1GPU-8C-15GB.small-g2.2xlarge",
    "gpu-4GPU-32C-60GB.medium-g2.8xlarge",
    "gpu-8GPU-32C-488GB.large-p2.8xlarge",
    "gpu-16GPU-64C-732GB.dedicated-p2.16xlarge",
    "enterprise-64C-976GB.large-x1.16xlarge",
    "enterprise-128C-1952GB.dedicated-x1.32xlarge",
];

pub const APPLIANCE_INSTANCE_TYPES: &[&str] =
    &["small-t2.large", "medium-r3.large", "large-c4.8xlarge"];

/// Raw instance types accepted as an override
pub const OVERRIDE_INSTANCE_TYPES: &[&str] = &[
    "c3.large-2C-3.75GB",
    "c3.xlarge-4C-7.5GB",
    "c3.2xlarge-8C-15GB",
    "c3.4xlarge-16C-30GB",
    "c3.8xlarge-32C-60GB",
    "c4.large-2C-3.75GB",
    "c4.xlarge-4C-7.5GB",
    "c4.2xlarge-8C-15GB",
    "c4.4xlarge-16C-30GB",
    "c4.8xlarge-36C-60GB",
    "d2.xlarge-4C-30.5GB",
    "d2.2xlarge-8C-61GB",
    "d2.4xlarge-16C-122GB",
    "d2.8xlarge-36C-244GB",
    "g2.2xlarge-1GPU-8C-15GB",
    "g2.8xlarge-4GPU-32C-60GB",
    "i2.xlarge-4C-30.5GB",
    "i2.2xlarge-8C-61GB",
    "i2.4xlarge-16C-122GB",
    "i2.8xlarge-32C-244GB",
    "m3.medium-1C-3.75GB",
    "m3.large-2C-7.5GB",
    "m3.xlarge-4C-15GB",
    "m3.2xlarge-8C-30GB",
    "m4.large-2C-8GB",
    "m4.xlarge-4C-16GB",
    "m4.2xlarge-8C-32GB",
    "m4.4xlarge-16C-64GB",
    "m4.10xlarge-40C-160GB",
    "m4.16xlarge-64C-256GB",
    "p2.xlarge-4GPU-4C-61GB",
    "p2.8xlarge-8GPU-32C-488GB",
    "p2.16xlarge-16GPU-64C-732GB",
    "r3.large-2C-15.25GB",
    "r3.xlarge-4C-30.5GB",
    "r3.2xlarge-8C-61GB",
    "r3.4xlarge-16C-122GB",
    "r3.8xlarge-32C-244GB",
    "t2.nano-1C-0.5GB",
    "t2.micro-1C-1GB",
    "t2.small-1C-2GB",
    "t2.medium-2C-4GB",
    "t2.large-2C-8GB",
    "x1.16xlarge-64C-076GB",
    "x1.32xlarge-128C-1952GB",
];

pub const SYSTEM_VOLUME_TYPES: &[&str] = &["magnetic.standard", "general-purpose-ssd.gp2"];

pub const OTHER_VOLUME_TYPES: &[&str] = &[
    "magnetic.standard",
    "general-purpose-ssd.gp2",
    "throughput-optimized-hdd.st1",
    "cold-hdd.sc1",
];

pub const SOFTWARE_TYPES: &[&str] = &[
    "-none-",
    "benchmark",
    "bioinformatics",
    "cfd",
    "chemistry",
    "development",
];

pub const SCHEDULER_TYPES: &[&str] = &["gridscheduler", "openlava", "pbspro", "slurm", "torque"];

/// Every catalog with its heading, in display order
pub const CATALOGS: &[(&str, &[&str])] = &[
    ("compute instance type", COMPUTE_INSTANCE_TYPES),
    ("master instance type", MASTER_INSTANCE_TYPES),
    ("appliance instance type", APPLIANCE_INSTANCE_TYPES),
    ("instance type override", OVERRIDE_INSTANCE_TYPES),
    ("system volume type", SYSTEM_VOLUME_TYPES),
    ("other volume type", OTHER_VOLUME_TYPES),
    ("preload software", SOFTWARE_TYPES),
    ("scheduler type", SCHEDULER_TYPES),
];

pub fn is_master_instance_type(value: &str) -> bool {
    MASTER_INSTANCE_TYPES.contains(&value)
}

pub fn is_compute_instance_type(value: &str) -> bool {
    COMPUTE_INSTANCE_TYPES.contains(&value)
}

pub fn is_appliance_instance_type(value: &str) -> bool {
    APPLIANCE_INSTANCE_TYPES.contains(&value)
}

/// Human-readable listing of every catalog
pub fn render_catalogs() -> String {
    CATALOGS
        .iter()
        .map(|(title, values)| format!(" == {} ==\n\n     {}\n\n", title, values.join("\n     ")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookups() {
        assert!(is_master_instance_type("small-t2.large"));
        assert!(!is_master_instance_type("t2.large"));
        assert!(is_compute_instance_type("compute-2C-3.75GB.small-c4.large"));
        assert!(is_appliance_instance_type("medium-r3.large"));
    }

    #[test]
    fn test_render() {
        let out = render_catalogs();
        assert!(out.starts_with(" == compute instance type ==\n\n     compute-2C"));
        assert!(out.contains(" == scheduler type ==\n\n     gridscheduler\n     openlava"));
    }
}
