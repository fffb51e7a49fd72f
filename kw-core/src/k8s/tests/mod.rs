
use rstest::*;
use kw_testutils::*;

use super::*;
