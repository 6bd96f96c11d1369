//! Legacy site discovery for the site catalog.
//!
//! Provides:
//! - MDS (LDAP) entries mapped into the legacy pool config
//! - VORS site listings and site descriptions mapped into sites
//! - OSGMM `condor_status` rows mapped into sites and SRM properties

pub mod error;
pub mod mds;
pub mod osgmm;
pub mod vors;

pub use error::{QueryError, QueryResult};
pub use mds::{LdapEntry, LdapSearch, MdsQuery};
pub use osgmm::{CommandRunner, OsgmmQuery, ProcessRunner};
pub use vors::{VoSite, VorsClient, VorsSiteInfo};
