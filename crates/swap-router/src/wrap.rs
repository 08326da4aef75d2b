//! Native <-> wrapped-native detection. Decided before either router is asked.

use crate::chains::ChainConfig;
use crate::types::{Currency, WrapType};

pub fn wrap_type(chain: &ChainConfig, input: &Currency, output: &Currency) -> WrapType {
    if input.is_native() && output.id == chain.wrapped_native.id {
        WrapType::Wrap
    } else if input.id == chain.wrapped_native.id && output.is_native() {
        WrapType::Unwrap
    } else {
        WrapType::NotApplicable
    }
}
