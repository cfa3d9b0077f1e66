use itertools::Itertools;

use credentials::{resolve_key, valid_keys, CredentialsStore};
use util::errors::Res;

pub enum ConfigOp {
    Get { key: String },
    Set { key: String, value: String },
    List,
}

pub struct ConfigCtx {
    pub store: CredentialsStore,
    pub op: ConfigOp,
}

/// Reads or writes the credentials store.
pub fn config(ctx: ConfigCtx) -> Res<()> {
    match ctx.op {
        ConfigOp::Get { key } => {
            let internal = resolve_internal_key(&key)?;
            let entry = ctx.store.get(internal)?;
            println!("{} = {} (from {})", entry.cli_key, entry.value, entry.source);
        }
        ConfigOp::Set { key, value } => {
            let internal = resolve_internal_key(&key)?;
            ctx.store.set(internal, &value)?;
            println!("Set {} = {}", key, value);
        }
        ConfigOp::List => {
            for entry in ctx.store.list()? {
                println!("{:<12} {} (from {})", entry.cli_key, entry.value, entry.source);
            }
        }
    }
    Ok(())
}

fn resolve_internal_key(cli_key: &str) -> Res<&'static str> {
    resolve_key(cli_key).ok_or_else(|| {
        format_err!(
            "unknown config key '{}'; valid keys are: {}",
            cli_key,
            valid_keys().iter().join(", ")
        )
    })
}
