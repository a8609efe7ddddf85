use crate::config::Config;
use crate::database::DbError;
use crate::modules::allowlist::database::AllowList;

#[derive(Debug)]
pub struct Databases {
    pub allow_list: AllowList,
}

impl Databases {
    pub async fn open(config: &Config) -> Result<Self, DbError> {
        Ok(Self {
            allow_list: AllowList::new(config.allow_list_path()).await?,
        })
    }
}
