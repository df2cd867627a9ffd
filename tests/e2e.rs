//! End-to-end tests for docmgr-ocr with real processes.
//!
//! Ghostscript and Tesseract are replaced by small `/bin/sh` scripts with the
//! same command-line contract, so these tests exercise the real
//! `TokioProcessRunner`: spawning, pipe draining, exit codes, deadlines and
//! killing the process tree. They run on unix only.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

#![cfg(unix)]

use docmgr_ocr::pipeline::rasterize::GHOSTSCRIPT_EXE;
use docmgr_ocr::pipeline::recognize::TESSERACT_EXE;
use docmgr_ocr::{DocumentRef, OcrErrorKind, OcrPipeline, PipelineConfig, PipelineConfigBuilder};
use once_cell::sync::Lazy;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ── Fake tools ───────────────────────────────────────────────────────────────

const FAKE_GS: &str = r#"#!/bin/sh
# Records its arguments next to the output, then writes a tiny TIFF.
out=""
for a in "$@"; do
  case "$a" in
    -sOutputFile=*) out="${a#-sOutputFile=}" ;;
  esac
done
[ -n "$out" ] || { echo "no output file"; exit 1; }
printf '%s\n' "$@" > "$out.args"
printf 'II*\000' > "$out"
echo "GPL Ghostscript: processing page 1"
"#;

const FAKE_TESSERACT: &str = r#"#!/bin/sh
# usage: tesseract <image> <outputbase> -l <lang>
echo "Tesseract Open Source OCR Engine (fake) with $4" >&2
printf 'recognised %s in %s\n\f' "$(basename "$1")" "$4" > "$2.txt"
"#;

const FAKE_TESSERACT_NO_LANG: &str = r#"#!/bin/sh
echo "Error opening data file ./$4.traineddata" >&2
echo "Failed loading language '$4'" >&2
echo "Tesseract couldn't load any languages!" >&2
exit 1
"#;

/// Never finishes: leaves a descendant running and waits for it.
const FAKE_TESSERACT_HANG: &str = r#"#!/bin/sh
sleep 300 &
echo $! > "$2.pid"
wait
"#;

const FAKE_GS_FAIL: &str = r#"#!/bin/sh
echo "**** Error: Cannot find a %%EOF marker anywhere in the file."
echo "**** Unrecoverable error, exit code 1"
exit 1
"#;

/// One directory per tool behaviour, written once before any test spawns a
/// process (a script still open for writing cannot be executed).
static TOOLS: Lazy<TempDir> = Lazy::new(|| {
    let dir = tempfile::tempdir().unwrap();
    let sets: [(&str, &str, &str); 4] = [
        ("ok", FAKE_GS, FAKE_TESSERACT),
        ("nolang", FAKE_GS, FAKE_TESSERACT_NO_LANG),
        ("hang", FAKE_GS, FAKE_TESSERACT_HANG),
        ("gsfail", FAKE_GS_FAIL, FAKE_TESSERACT),
    ];
    for (name, gs, tesseract) in sets {
        let set = dir.path().join(name);
        std::fs::create_dir_all(&set).unwrap();
        write_script(&set.join(GHOSTSCRIPT_EXE), gs);
        write_script(&set.join(TESSERACT_EXE), tesseract);
    }
    dir
});

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn tools(set: &str) -> PathBuf {
    TOOLS.path().join(set)
}

// ── Test helpers ─────────────────────────────────────────────────────────────

fn builder(dir: &TempDir, set: &str) -> PipelineConfigBuilder {
    PipelineConfig::builder()
        .app_root(dir.path())
        .uploads_folder("uploads")
        .ocr_output_folder("ocr")
        .work_folder("work")
        .ghostscript_dir(tools(set))
        .tesseract_dir(tools(set))
}

fn upload(dir: &TempDir, name: &str, bytes: &[u8]) {
    let uploads = dir.path().join("uploads");
    std::fs::create_dir_all(&uploads).unwrap();
    std::fs::write(uploads.join(name), bytes).unwrap();
}

fn files_with_ext(dir: &Path, ext: &str) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|e| e == ext))
                .collect()
        })
        .unwrap_or_default()
}

/// Zombies count as dead: an orphan may wait a while for its reaper.
fn process_alive(pid: i32) -> bool {
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        let state = stat.rsplit(')').next().and_then(|rest| rest.trim().chars().next());
        return !matches!(state, Some('Z') | Some('X'));
    }
    unsafe { libc::kill(pid, 0) == 0 }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn image_through_real_process() {
    let dir = tempfile::tempdir().unwrap();
    upload(&dir, "photo.jpg", b"\xff\xd8\xff");
    let pipeline = OcrPipeline::new(builder(&dir, "ok").build().unwrap());

    let result = pipeline.run(&DocumentRef::stored("photo.jpg")).await;

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.text, "recognised photo.jpg in eng\n\x0c");
    assert!(!result.rasterized);
    assert!(files_with_ext(&dir.path().join("ocr"), "txt").is_empty());
}

#[tokio::test]
async fn pdf_through_real_processes_with_normalisation() {
    let dir = tempfile::tempdir().unwrap();
    upload(&dir, "minutes.pdf", b"%PDF-1.5\n%\xe2\xe3\xcf\xd3\n");
    let config = builder(&dir, "ok")
        .language("eng+deu")
        .normalize_text(true)
        .build()
        .unwrap();

    let result = OcrPipeline::new(config).run(&DocumentRef::stored("minutes.pdf")).await;

    assert!(result.is_success(), "{:?}", result.error);
    assert!(result.rasterized);
    assert_eq!(
        result.text,
        format!("recognised minutes.{}.tif in eng+deu", result.job_id)
    );
    assert!(files_with_ext(&dir.path().join("work"), "tif").is_empty());
    assert!(files_with_ext(&dir.path().join("ocr"), "txt").is_empty());
}

#[tokio::test]
async fn password_reaches_ghostscript() {
    let dir = tempfile::tempdir().unwrap();
    upload(&dir, "locked.pdf", b"%PDF-1.6\ntrailer << /Encrypt 4 0 R >>\n");
    let config = builder(&dir, "ok").pdf_password("hunter2").build().unwrap();

    let result = OcrPipeline::new(config).run(&DocumentRef::stored("locked.pdf")).await;

    assert!(result.is_success(), "{:?}", result.error);
    // The fake left its argument list beside the (now deleted) TIFF.
    let args_files = files_with_ext(&dir.path().join("work"), "args");
    assert_eq!(args_files.len(), 1);
    let args = std::fs::read_to_string(&args_files[0]).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(
        &args[..5],
        ["-dNOPAUSE", "-r300", "-sDEVICE=tiffscaled24", "-sCompression=lzw", "-dBATCH"]
    );
    assert_eq!(args[5], "-sPDFPassword=hunter2");
    assert!(args[7].ends_with("uploads/locked.pdf"));
}

#[tokio::test]
async fn ghostscript_failure_carries_its_output() {
    let dir = tempfile::tempdir().unwrap();
    upload(&dir, "truncated.pdf", b"%PDF-1.4\n");
    let pipeline = OcrPipeline::new(builder(&dir, "gsfail").build().unwrap());

    let result = pipeline.run(&DocumentRef::stored("truncated.pdf")).await;

    let err = result.error.expect("raster failure expected");
    assert_eq!(err.kind, OcrErrorKind::RasterFailed);
    assert!(err.message.contains("exit code 1"), "{}", err.message);
    assert!(err.message.contains("%%EOF marker"), "{}", err.message);
}

#[tokio::test]
async fn missing_language_data_is_classified() {
    let dir = tempfile::tempdir().unwrap();
    upload(&dir, "scan.png", b"\x89PNG");
    let pipeline = OcrPipeline::new(builder(&dir, "nolang").build().unwrap());

    let result = pipeline
        .run_with_language(&DocumentRef::stored("scan.png"), "tlh")
        .await;

    let err = result.error.expect("language failure expected");
    assert_eq!(err.kind, OcrErrorKind::LanguageUnavailable);
    assert!(err.message.contains("'tlh'"));
}

#[tokio::test]
async fn missing_tool_is_launch_error() {
    let dir = tempfile::tempdir().unwrap();
    upload(&dir, "scan.png", b"\x89PNG");
    let config = builder(&dir, "ok")
        .tesseract_dir(dir.path().join("no-such-dir"))
        .build()
        .unwrap();

    let result = OcrPipeline::new(config).run(&DocumentRef::stored("scan.png")).await;

    let err = result.error.expect("launch failure expected");
    assert_eq!(err.kind, OcrErrorKind::Io);
    assert!(err.message.contains("no-such-dir"));
}

#[tokio::test]
async fn hung_ocr_is_killed_at_the_deadline() {
    let dir = tempfile::tempdir().unwrap();
    upload(&dir, "stuck.png", b"\x89PNG");
    let config = builder(&dir, "hang").ocr_timeout_secs(1).build().unwrap();

    let start = Instant::now();
    let result = OcrPipeline::new(config).run(&DocumentRef::stored("stuck.png")).await;
    let elapsed = start.elapsed();

    let err = result.error.expect("timeout expected");
    assert_eq!(err.kind, OcrErrorKind::Timeout);
    assert!(elapsed >= Duration::from_secs(1), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(15), "kill took too long: {elapsed:?}");

    let pid_files = files_with_ext(&dir.path().join("ocr"), "pid");
    assert_eq!(pid_files.len(), 1);
    let pid: i32 = std::fs::read_to_string(&pid_files[0])
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    let mut alive = true;
    for _ in 0..50 {
        alive = process_alive(pid);
        if !alive {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(!alive, "OCR descendant {pid} outlived the job");
}
