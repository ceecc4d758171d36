#![warn(clippy::pedantic)]
// Don't care enough to fix
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::similar_names)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::wildcard_imports)]

pub mod acl;
pub mod answer;
pub mod context;
pub mod journal;
pub mod processor;
pub mod rrl;
pub mod tsig;
pub mod update;
pub mod xfr;
