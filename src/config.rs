use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dotenvy::dotenv;
use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub encryption_master_key: [u8; 32],
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| AppError::Config("JWT_SECRET missing".into()))?;

        let master_key_b64 = env::var("MESSAGE_ENCRYPTION_MASTER_KEY")
            .map_err(|_| AppError::Config("MESSAGE_ENCRYPTION_MASTER_KEY missing".into()))?;
        let master_key_bytes = STANDARD
            .decode(master_key_b64.trim())
            .map_err(|_| AppError::Config("MESSAGE_ENCRYPTION_MASTER_KEY invalid base64".into()))?;
        if master_key_bytes.len() != 32 {
            return Err(AppError::Config(
                "MESSAGE_ENCRYPTION_MASTER_KEY must decode to 32 bytes".into(),
            ));
        }
        let mut encryption_master_key = [0u8; 32];
        encryption_master_key.copy_from_slice(&master_key_bytes);

        Ok(Self {
            database_url,
            redis_url,
            port,
            jwt_secret,
            encryption_master_key,
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            redis_url: "redis://127.0.0.1:6379/0".into(),
            port: 3000,
            jwt_secret: "test-secret".into(),
            encryption_master_key: [0u8; 32],
        }
    }
}
