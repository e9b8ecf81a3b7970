use crate::error::{AppError, AppResult, FileError};
use crate::models::job::GenerationJob;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载生成任务
pub async fn load_job(toml_file_path: &Path) -> AppResult<GenerationJob> {
    let path_str = toml_file_path.display().to_string();
    let content = fs::read_to_string(toml_file_path)
        .await
        .map_err(|e| AppError::file_read_failed(&path_str, e))?;

    let mut job: GenerationJob = toml::from_str(&content).map_err(|e| FileError::TomlParseFailed {
        path: path_str.clone(),
        source: e,
    })?;

    // 设置文件路径
    job.file_path = Some(path_str);

    Ok(job)
}

/// 从文件夹中加载所有任务（按文件名排序，解析失败的文件跳过）
pub async fn load_all_jobs(folder_path: &str) -> AppResult<Vec<GenerationJob>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        return Err(FileError::DirectoryNotFound {
            path: folder_path.to_string(),
        }
        .into());
    }

    let mut toml_files = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .map_err(|e| AppError::file_read_failed(folder_path, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::file_read_failed(folder_path, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml_files.push(path);
        }
    }
    toml_files.sort();

    let mut jobs = Vec::new();
    for path in toml_files {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_job(&path).await {
            Ok(job) if job.keywords.iter().any(|k| !k.trim().is_empty()) || job.selected_title.is_some() => {
                tracing::info!("成功加载任务，关键词: {}", job.keywords.join(", "));
                jobs.push(job);
            }
            Ok(_) => {
                tracing::warn!("任务缺少关键词和标题，跳过: {}", path.display());
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::options::ArticleLength;

    #[tokio::test]
    async fn test_load_all_jobs_skips_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b_espresso.toml"),
            r#"
keywords = ["エスプレッソマシン"]
target_word_count = 1000
essential_keywords = ["ミルク"]
ng_keywords = ["激安"]
"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("a_broken.toml"), "keywords = 12").unwrap();
        std::fs::write(dir.path().join("c_empty.toml"), "keywords = []").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let jobs = load_all_jobs(dir.path().to_str().unwrap()).await.unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.session_id(), "b_espresso");
        assert_eq!(job.article_length, ArticleLength::Medium);
        assert_eq!(job.options().target_word_count, Some(1000));
        assert_eq!(job.keyword_preferences().ng(), vec!["激安".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_folder_is_error() {
        let result = load_all_jobs("/definitely/not/here").await;
        assert!(matches!(
            result,
            Err(AppError::File(FileError::DirectoryNotFound { .. }))
        ));
    }
}
