
use kw_core::prelude::*;
use kw_testutils::*;
use rstest::*;

use super::*;
