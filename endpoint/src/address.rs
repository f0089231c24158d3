use crate::EndpointError;

/// Check that `address` is a `0x`-prefixed, 20-byte hex contract address.
pub fn validate_contract_address(address: &str) -> Result<(), EndpointError> {
    let hex = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| EndpointError::InvalidAddress(address.to_string()))?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EndpointError::InvalidAddress(address.to_string()));
    }
    Ok(())
}
