mod completions_test;
mod probes_test;

use assertables::*;
use rstest::*;

use super::*;
