//! Prints a fresh set of secrets in `.env` format.

use std::fmt::Write as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;

const JWT_SECRET_BYTES: usize = 64;
const ENCRYPTION_KEY_BYTES: usize = 32;
const SESSION_SECRET_BYTES: usize = 32;
const API_SECRET_BYTES: usize = 24;

/// One generated set of secrets.
#[derive(Debug)]
struct Secrets {
    jwt_secret: String,
    encryption_key: String,
    session_secret: String,
    api_secret: String,
}

impl Secrets {
    fn generate() -> Self {
        Self {
            jwt_secret: STANDARD.encode(random_bytes(JWT_SECRET_BYTES)),
            encryption_key: to_hex(&random_bytes(ENCRYPTION_KEY_BYTES)),
            session_secret: to_hex(&random_bytes(SESSION_SECRET_BYTES)),
            api_secret: to_hex(&random_bytes(API_SECRET_BYTES)),
        }
    }

    fn render(&self) -> String {
        format!(
            "# Generated secrets. Copy these into your .env file.\n\
             JWT_SECRET={}\n\
             ENCRYPTION_KEY={}\n\
             SESSION_SECRET={}\n\
             API_SECRET={}\n\
             \n\
             # Notes:\n\
             # - Never commit these values to version control.\n\
             # - Use different values for each environment.\n\
             # - Rotating ENCRYPTION_KEY makes previously encrypted data unreadable.\n",
            self.jwt_secret, self.encryption_key, self.session_secret, self.api_secret
        )
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

fn main() {
    print!("{}", Secrets::generate().render());
}
