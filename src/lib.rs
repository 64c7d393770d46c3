//! r10k deployer - turns GitLab branch events into Puppetfile updates and
//! r10k deployments.
//!
//! A push to a module repository creates, updates or deletes a branch. The
//! deployer mirrors that branch in the Puppetfile repository, points the
//! module's entry at it, and asks Rundeck to deploy the matching r10k
//! environment.

pub mod actions;
pub mod config;
pub mod git;
pub mod manifest;
pub mod rundeck;
pub mod server;
pub mod spool;
pub mod types;
pub mod webhooks;
pub mod worker;

#[cfg(test)]
mod test_utils;
