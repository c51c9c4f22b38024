use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Bytes of randomness in an access token (256 bits).
const ACCESS_TOKEN_BYTES: usize = 32;

/// Generate a fresh gallery access token: 256 bits from the OS CSPRNG,
/// URL-safe base64 without padding.
pub fn generate_access_token() -> String {
    let mut bytes = [0u8; ACCESS_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Link handed to clients; reconstructible from the gallery id and token.
pub fn share_url(frontend_origin: &str, gallery_id: uuid::Uuid, access_token: &str) -> String {
    format!(
        "{}/galleries/{}?token={}",
        frontend_origin.trim_end_matches('/'),
        gallery_id,
        access_token
    )
}
