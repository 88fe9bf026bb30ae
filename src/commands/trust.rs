use treeline::styling::{println, success_message};
use treeline::trust::TrustStore;

use crate::cli::TrustCommand;

pub(crate) fn handle_trust(action: TrustCommand) -> anyhow::Result<()> {
    let mut store = TrustStore::open_default()?;
    match action {
        TrustCommand::Check { file } => println!("{}", store.check_trust(&file)),
        TrustCommand::Add { file } => {
            store.trust_file(&file)?;
            println!("{}", success_message(format!("Trusted {}", file.display())));
        }
    }
    Ok(())
}
