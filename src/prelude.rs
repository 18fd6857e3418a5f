//! Imports used by practically every module of this crate.

pub(crate) use anyhow::{Context as _, Result, anyhow, bail};
pub(crate) use tracing::{debug, error, info, trace, warn};
