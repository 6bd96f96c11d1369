//! Job submission endpoints of a site.

use derive_more::Display;
use std::str::FromStr;

use crate::sysinfo::{Architecture, Os};
use crate::{Error, Result};

/// Middleware flavour of a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum GatewayType {
    #[default]
    #[display("gt2")]
    Gt2,
    #[display("gt4")]
    Gt4,
    #[display("gt5")]
    Gt5,
    #[display("condor")]
    Condor,
    #[display("cream")]
    Cream,
    #[display("batch")]
    Batch,
    #[display("pbs")]
    Pbs,
    #[display("lsf")]
    Lsf,
    #[display("sge")]
    Sge,
    #[display("nordugrid")]
    Nordugrid,
    #[display("unicore")]
    Unicore,
    #[display("ec2")]
    Ec2,
    #[display("deltacloud")]
    Deltacloud,
}

impl FromStr for GatewayType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gt2" => Ok(Self::Gt2),
            "gt4" => Ok(Self::Gt4),
            "gt5" => Ok(Self::Gt5),
            "condor" => Ok(Self::Condor),
            "cream" => Ok(Self::Cream),
            "batch" => Ok(Self::Batch),
            "pbs" => Ok(Self::Pbs),
            "lsf" => Ok(Self::Lsf),
            "sge" => Ok(Self::Sge),
            "nordugrid" => Ok(Self::Nordugrid),
            "unicore" => Ok(Self::Unicore),
            "ec2" => Ok(Self::Ec2),
            "deltacloud" => Ok(Self::Deltacloud),
            _ => Err(Error::invalid("grid type", s)),
        }
    }
}

/// Class of jobs a gateway accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Display)]
pub enum JobType {
    #[default]
    #[display("compute")]
    Compute,
    /// Written `auxillary` in every catalog format.
    #[display("auxillary")]
    Auxiliary,
    #[display("transfer")]
    Transfer,
    #[display("register")]
    Register,
    #[display("cleanup")]
    Cleanup,
}

impl FromStr for JobType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "compute" => Ok(Self::Compute),
            "auxillary" | "auxiliary" => Ok(Self::Auxiliary),
            "transfer" => Ok(Self::Transfer),
            "register" => Ok(Self::Register),
            "cleanup" => Ok(Self::Cleanup),
            _ => Err(Error::invalid("jobtype", s)),
        }
    }
}

/// Batch scheduler behind a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum SchedulerType {
    #[default]
    #[display("fork")]
    Fork,
    #[display("lsf")]
    Lsf,
    #[display("pbs")]
    Pbs,
    #[display("condor")]
    Condor,
    #[display("sge")]
    Sge,
    #[display("slurm")]
    Slurm,
    #[display("moab")]
    Moab,
    #[display("unknown")]
    Unknown,
}

impl SchedulerType {
    /// Unrecognised scheduler names become [`SchedulerType::Unknown`].
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Self::Unknown)
    }

    /// Scheduler named by a `host/jobmanager-<scheduler>` contact, `fork` when absent.
    pub fn from_contact(contact: &str) -> Self {
        let suffix = contact.rsplit('/').next().unwrap_or_default();
        match suffix.strip_prefix("jobmanager-") {
            Some(name) => Self::parse_lenient(name),
            None if suffix == "jobmanager" => Self::Fork,
            None => {
                [Self::Condor, Self::Fork, Self::Pbs, Self::Lsf, Self::Sge]
                    .into_iter()
                    .find(|s| contact.ends_with(&s.to_string()))
                    .unwrap_or(Self::Fork)
            }
        }
    }
}

impl FromStr for SchedulerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fork" => Ok(Self::Fork),
            "lsf" => Ok(Self::Lsf),
            "pbs" => Ok(Self::Pbs),
            "condor" => Ok(Self::Condor),
            "sge" => Ok(Self::Sge),
            "slurm" => Ok(Self::Slurm),
            "moab" => Ok(Self::Moab),
            "unknown" => Ok(Self::Unknown),
            _ => Err(Error::invalid("scheduler", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridGateway {
    pub gateway_type: GatewayType,
    pub contact: String,
    pub scheduler: SchedulerType,
    pub job_type: JobType,
    pub os: Option<Os>,
    pub arch: Option<Architecture>,
    pub os_release: Option<String>,
    pub os_version: Option<String>,
    pub glibc: Option<String>,
    pub idle_nodes: Option<u32>,
    pub total_nodes: Option<u32>,
}

impl Default for GridGateway {
    fn default() -> Self {
        Self::new(GatewayType::Gt2, "localhost/jobmanager-fork", SchedulerType::Fork)
    }
}

impl GridGateway {
    pub fn new(gateway_type: GatewayType, contact: impl Into<String>, scheduler: SchedulerType) -> Self {
        Self {
            gateway_type,
            contact: contact.into(),
            scheduler,
            job_type: JobType::Compute,
            os: None,
            arch: None,
            os_release: None,
            os_version: None,
            glibc: None,
            idle_nodes: None,
            total_nodes: None,
        }
    }

    pub fn with_job_type(mut self, job_type: JobType) -> Self {
        self.job_type = job_type;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_spellings() {
        assert_eq!("auxillary".parse::<JobType>().unwrap(), JobType::Auxiliary);
        assert_eq!("auxiliary".parse::<JobType>().unwrap(), JobType::Auxiliary);
        assert_eq!(JobType::Auxiliary.to_string(), "auxillary");
    }

    #[test]
    fn test_scheduler_lenient() {
        assert_eq!(SchedulerType::parse_lenient("PBS"), SchedulerType::Pbs);
        assert_eq!(SchedulerType::parse_lenient("torque"), SchedulerType::Unknown);
    }

    #[test]
    fn test_scheduler_from_contact() {
        assert_eq!(
            SchedulerType::from_contact("smarty.isi.edu/jobmanager-pbs"),
            SchedulerType::Pbs
        );
        assert_eq!(
            SchedulerType::from_contact("smarty.isi.edu/jobmanager"),
            SchedulerType::Fork
        );
        assert_eq!(
            SchedulerType::from_contact("cluster.edu/condor"),
            SchedulerType::Condor
        );
        assert_eq!(SchedulerType::from_contact("cluster.edu"), SchedulerType::Fork);
    }

    #[test]
    fn test_default_gateway() {
        let gw = GridGateway::default();
        assert_eq!(gw.gateway_type, GatewayType::Gt2);
        assert_eq!(gw.contact, "localhost/jobmanager-fork");
        assert_eq!(gw.scheduler, SchedulerType::Fork);
        assert_eq!(gw.job_type, JobType::Compute);
    }
}
