//! Plain shared library resolved by `fixture-layers --features dependent`.

/// Value the dependent module checks in `attach`.
#[unsafe(no_mangle)]
pub extern "C" fn tickswap_companion_value() -> u32 {
    42
}
