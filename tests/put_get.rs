//! PUT/GET 端到端场景测试（本地目录 stage）

use filestage::core::codec;
use filestage::{
    AgentConfig, FileTransferAgent, LocalStage, ResultRow, StageBackend, TransferReport,
};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

const ROW_DATA: &str = "FIRST,SECOND,THIRD\nFIRST,SECOND,THIRD\nFIRST,SECOND,THIRD\nFIRST,SECOND,THIRD\n";
const ROW_DATA_SIZE: u64 = 76;
const ROW_DATA_OVERWRITE: &str = "THIRD,FIRST,SECOND\n";
const ROW_DATA_OVERWRITE_SIZE: u64 = 19;

fn fast_agent() -> FileTransferAgent {
    FileTransferAgent::with_config(AgentConfig {
        retry_base_delay_ms: 1,
        ..AgentConfig::default()
    })
}

async fn run(
    agent: &FileTransferAgent,
    command: &str,
    backend: Arc<dyn StageBackend>,
) -> (TransferReport, Vec<ResultRow>) {
    let (tx, mut rx) = mpsc::channel(128);
    let report = agent.execute(command, backend, tx).await.unwrap();
    let mut rows = Vec::new();
    while let Ok(row) = rx.try_recv() {
        rows.push(row);
    }
    (report, rows)
}

fn gunzip(path: &Path) -> Vec<u8> {
    let compressed = fs::read(path).unwrap();
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(&compressed[..])
        .read_to_end(&mut out)
        .unwrap();
    out
}

/// 场景一：默认压缩上传 76 字节 CSV，校验 GZIP 行与下载往返
#[tokio::test]
async fn test_put_default_compression_then_get() {
    let local_dir = tempfile::tempdir().unwrap();
    let stage_dir = tempfile::tempdir().unwrap();
    let get_dir = tempfile::tempdir().unwrap();

    let csv_path = local_dir.path().join("rows.csv");
    fs::write(&csv_path, ROW_DATA).unwrap();
    assert_eq!(fs::metadata(&csv_path).unwrap().len(), ROW_DATA_SIZE);

    let stage = Arc::new(LocalStage::new(stage_dir.path().to_str().unwrap()).unwrap());
    let agent = fast_agent();

    let put = format!("PUT file://{} @db.schema.%temp_table", csv_path.display());
    let (report, rows) = run(&agent, &put, stage.clone()).await;

    assert_eq!(report.filesMatched, 1);
    assert_eq!(rows.len(), 1);
    let ResultRow::Put(row) = &rows[0] else {
        panic!("expected put row");
    };
    assert_eq!(row.status, "UPLOADED");
    assert_eq!(row.sourceCompression, "NONE");
    assert_eq!(row.targetCompression, "GZIP");
    assert_eq!(row.source, "rows.csv");
    assert_eq!(row.target, "rows.csv.gz");
    assert_eq!(row.sourceSize, ROW_DATA_SIZE);
    let uploaded_size = row.targetSize;

    // 下载到全新目录，大小与上传回执一致，解压后与原始内容逐字节相等
    let get = format!(
        "GET @db.schema.%temp_table file://{}",
        get_dir.path().display()
    );
    let (report, rows) = run(&agent, &get, stage).await;
    assert_eq!(report.filesCompleted, 1);
    let ResultRow::Get(row) = &rows[0] else {
        panic!("expected get row");
    };
    assert_eq!(row.status, "DOWNLOADED");
    assert_eq!(row.size, uploaded_size);

    let downloaded = get_dir.path().join(&row.file);
    assert_eq!(gunzip(&downloaded), ROW_DATA.as_bytes());
}

/// 场景二：AUTO_COMPRESS=FALSE 上传 -> 重复上传跳过 -> OVERWRITE 强制覆盖
#[tokio::test]
async fn test_skip_then_overwrite() {
    let local_dir = tempfile::tempdir().unwrap();
    let stage_dir = tempfile::tempdir().unwrap();

    let file_path = local_dir.path().join("rows.csv");
    fs::write(&file_path, ROW_DATA_OVERWRITE).unwrap();

    let stage = Arc::new(LocalStage::new(stage_dir.path().to_str().unwrap()).unwrap());
    let agent = fast_agent();
    let put = format!(
        "PUT file://{} @db.schema.%temp_table AUTO_COMPRESS=FALSE",
        file_path.display()
    );

    let (_, rows) = run(&agent, &put, stage.clone()).await;
    let ResultRow::Put(row) = &rows[0] else {
        panic!("expected put row");
    };
    assert_eq!(row.status, "UPLOADED");
    assert_eq!(row.targetSize, ROW_DATA_OVERWRITE_SIZE);
    assert_eq!(row.targetCompression, "NONE");
    assert_eq!(stage.write_count(), 1);

    // 相同内容不带 OVERWRITE：跳过，没有新的网络写
    let (_, rows) = run(&agent, &put, stage.clone()).await;
    let ResultRow::Put(row) = &rows[0] else {
        panic!("expected put row");
    };
    assert_eq!(row.status, "SKIPPED");
    assert_eq!(stage.write_count(), 1);

    // 修改内容并带上 OVERWRITE=TRUE：强制重新上传，大小反映新内容
    fs::write(&file_path, ROW_DATA).unwrap();
    let put_overwrite = format!("{} OVERWRITE=TRUE", put);
    let (_, rows) = run(&agent, &put_overwrite, stage.clone()).await;
    let ResultRow::Put(row) = &rows[0] else {
        panic!("expected put row");
    };
    assert_eq!(row.status, "UPLOADED");
    assert_eq!(row.targetSize, ROW_DATA_SIZE);
    assert_eq!(stage.write_count(), 2);
}

/// 六种编码的往返属性：压缩内容上传后下载解压，与原文逐字节相等
#[tokio::test]
async fn test_round_trip_every_codec() {
    for sub_type in ["gzip", "bz2", "br", "deflate", "raw_deflate", "zstd"] {
        let encoding = codec::lookup_by_mime_sub_type(sub_type).unwrap();
        let local_dir = tempfile::tempdir().unwrap();
        let stage_dir = tempfile::tempdir().unwrap();
        let get_dir = tempfile::tempdir().unwrap();

        let file_name = format!("rows.csv{}", encoding.file_extension);
        let compressed = codec::compress(encoding, ROW_DATA.as_bytes()).unwrap();
        fs::write(local_dir.path().join(&file_name), &compressed).unwrap();

        let stage = Arc::new(LocalStage::new(stage_dir.path().to_str().unwrap()).unwrap());
        let agent = fast_agent();

        let put = format!(
            "PUT file://{}/{} @db.schema.%temp_table",
            local_dir.path().display(),
            file_name
        );
        let (_, rows) = run(&agent, &put, stage.clone()).await;
        let ResultRow::Put(row) = &rows[0] else {
            panic!("expected put row");
        };
        // 已压缩文件按原编码原样上传
        assert_eq!(row.status, "UPLOADED", "codec {}", encoding.name);
        assert_eq!(row.targetCompression, encoding.name);
        assert_eq!(row.targetSize, compressed.len() as u64);

        let get = format!(
            "GET @db.schema.%temp_table file://{}",
            get_dir.path().display()
        );
        let (_, rows) = run(&agent, &get, stage).await;
        let ResultRow::Get(row) = &rows[0] else {
            panic!("expected get row");
        };
        assert_eq!(row.status, "DOWNLOADED");
        assert_eq!(row.size, compressed.len() as u64);

        let downloaded = fs::read(get_dir.path().join(&row.file)).unwrap();
        let restored = codec::decompress(encoding, &downloaded).unwrap();
        assert_eq!(restored, ROW_DATA.as_bytes(), "codec {}", encoding.name);
    }
}

/// 多文件通配符上传与并行下载
#[tokio::test]
async fn test_multi_file_wildcard_put_get() {
    let local_dir = tempfile::tempdir().unwrap();
    let stage_dir = tempfile::tempdir().unwrap();
    let get_dir = tempfile::tempdir().unwrap();

    for i in 0..5 {
        let name = format!("upload_multi_{}.csv", i);
        fs::write(local_dir.path().join(name), ROW_DATA).unwrap();
    }
    // 不符合前缀的文件不应被上传
    fs::write(local_dir.path().join("decoy.csv"), ROW_DATA).unwrap();

    let stage = Arc::new(LocalStage::new(stage_dir.path().to_str().unwrap()).unwrap());
    let agent = fast_agent();

    let put = format!(
        "PUT file://{}/upload_multi_* @db.schema.%temp_table PARALLEL=3",
        local_dir.path().display()
    );
    let (report, rows) = run(&agent, &put, stage.clone()).await;
    assert_eq!(report.filesMatched, 5);
    assert_eq!(report.filesCompleted, 5);
    assert!(rows.iter().all(|r| r.status() == "UPLOADED"));

    let get = format!(
        "GET @db.schema.%temp_table file://{} PARALLEL=3",
        get_dir.path().display()
    );
    let (report, rows) = run(&agent, &get, stage).await;
    assert_eq!(report.filesCompleted, 5);
    assert_eq!(rows.len(), 5);

    for row in &rows {
        let ResultRow::Get(row) = row else {
            panic!("expected get row");
        };
        assert_eq!(row.status, "DOWNLOADED");
        assert_eq!(gunzip(&get_dir.path().join(&row.file)), ROW_DATA.as_bytes());
    }
}

/// 流式接口：行在传输过程中陆续到达，最后拿到汇总报告
#[tokio::test]
async fn test_streaming_interface() {
    let local_dir = tempfile::tempdir().unwrap();
    let stage_dir = tempfile::tempdir().unwrap();

    for i in 0..3 {
        fs::write(local_dir.path().join(format!("s{}.csv", i)), ROW_DATA).unwrap();
    }

    let stage: Arc<dyn StageBackend> =
        Arc::new(LocalStage::new(stage_dir.path().to_str().unwrap()).unwrap());
    let agent = fast_agent();

    let put = format!("PUT file://{}/s*.csv @s", local_dir.path().display());
    let (mut stream, handle) = agent.execute_streaming(put, stage);

    let mut statuses = Vec::new();
    while let Some(row) = stream.next().await {
        statuses.push(row.status().to_string());
    }

    assert_eq!(statuses, vec!["UPLOADED"; 3]);
    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.filesCompleted, 3);
}

/// PUT 匹配不到任何文件是命令级错误，不产生任何行
#[tokio::test]
async fn test_no_matching_files_is_fatal() {
    let local_dir = tempfile::tempdir().unwrap();
    let stage_dir = tempfile::tempdir().unwrap();
    let stage: Arc<dyn StageBackend> =
        Arc::new(LocalStage::new(stage_dir.path().to_str().unwrap()).unwrap());

    let (tx, mut rx) = mpsc::channel(8);
    let put = format!("PUT file://{}/absent_* @s", local_dir.path().display());
    let result = fast_agent().execute(&put, stage, tx).await;

    assert!(matches!(
        result,
        Err(filestage::TransferError::NoMatchingFiles(_))
    ));
    assert!(rx.try_recv().is_err());
}
