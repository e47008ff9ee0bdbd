use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::{CommandOutput, CommandRunner, CommandSpec, FileSystemAccess};
use mockall::mock;
use std::path::{Path, PathBuf};

mock! {
    pub Runner {}

    #[async_trait]
    impl CommandRunner for Runner {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
    }
}

mock! {
    pub Fs {}

    #[async_trait]
    impl FileSystemAccess for Fs {
        async fn exists(&self, path: &Path) -> Result<bool>;
        async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;
        async fn read_to_string(&self, path: &Path) -> Result<String>;
        async fn write_temp_file(&self, prefix: &str, contents: &str) -> Result<PathBuf>;
        async fn delete_file(&self, path: &Path) -> Result<()>;
    }
}
