//! A counter that survives restarts.
//!
//! Run it a few times; the count keeps going up. Set `BOLSA_SECRET_KEY` to 64
//! hex characters (or put it in a `.env` file) to encrypt the record.
//!
//! Pass a TOML file as the first argument to take the key, directory and
//! encryption settings from it instead (see [`bolsa::PersistConfig`]).

use bolsa::{AesGcmCipher, FileStorage, Hydration, PersistConfig, SecretKey, Store, StoreBuilder};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Counter {
    count: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (builder, dir) = match std::env::args().nth(1) {
        Some(path) => {
            let config = PersistConfig::load(&path)?;
            let dir = config.dir.clone();
            (StoreBuilder::from_config(Counter::default(), &config)?, dir)
        }
        None => {
            let storage = FileStorage::new(std::env::temp_dir().join("bolsa-demo"));
            let dir = storage.dir().to_path_buf();
            let mut builder = Store::builder(Counter::default()).persist("counter", storage);
            if let Ok(hex) = std::env::var(bolsa::config::DEFAULT_KEY_ENV) {
                builder = builder.encrypt(AesGcmCipher::new(&SecretKey::from_hex(&hex)?));
            }
            (builder, dir)
        }
    };

    let store = builder.build();
    match store.ready().await {
        Hydration::Restored => println!("Restored count {}", store.get().count),
        Hydration::Failed(e) => println!("Could not restore ({e}), starting over"),
        _ => println!("First run"),
    }

    let _sub = store.subscribe(|c| println!("count = {}", c.count));
    store.update(|c| c.count += 1).await?;

    println!("State saved under {}", dir.display());
    Ok(())
}
