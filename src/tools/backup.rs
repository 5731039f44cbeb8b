use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateBackupParams {
    #[schemars(description = "Index to back up")]
    pub index_name: String,

    #[schemars(description = "Name for the backup")]
    pub backup_name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListBackupsParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RestoreBackupParams {
    #[schemars(description = "Backup to restore")]
    pub backup_name: String,

    #[schemars(description = "Name of the new index the backup is restored into")]
    pub target_index_name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteBackupParams {
    #[schemars(description = "Backup to delete")]
    pub backup_name: String,

    #[schemars(description = "Must be true. Deleting a backup cannot be undone.")]
    pub confirm: Option<bool>,
}
