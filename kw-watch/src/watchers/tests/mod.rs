mod obj_watcher_test;

use std::time::Duration;

use kw_core::prelude::*;
use kw_testutils::*;
use rstest::*;
use tokio_util::sync::CancellationToken;

use super::*;
