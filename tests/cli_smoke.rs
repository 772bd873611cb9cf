use std::path::PathBuf;
use std::process::Command;

fn bin() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_probeprep")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "probeprep.exe"
            } else {
                "probeprep"
            });
            p
        })
}

fn write_probe_exr(path: &std::path::Path) {
    let (w, h) = (640u32, 420u32);
    let pixels = (w * h) as usize;
    let mut data = Vec::with_capacity(pixels * 4);
    for _ in 0..pixels {
        data.extend_from_slice(&[0.3, 0.6, 0.9, 1.0]);
    }
    let buf = image::Rgba32FImage::from_raw(w, h, data).unwrap();
    image::DynamicImage::ImageRgba32F(buf)
        .save_with_format(path, image::ImageFormat::OpenExr)
        .unwrap();
}

#[test]
fn cli_crop_writes_pngs() {
    let dir = PathBuf::from("target").join("cli_smoke").join("crop");
    let _ = std::fs::remove_dir_all(&dir);
    let group = dir.join("renders").join("diffuse");
    std::fs::create_dir_all(&group).unwrap();
    write_probe_exr(&group.join("probe-01.exr"));

    let out_dir = dir.join("cropped");
    let report = dir.join("report.json");
    let status = Command::new(bin())
        .args([
            "crop",
            "--input-dir",
            dir.join("renders").to_str().unwrap(),
            "--output-dir",
            out_dir.to_str().unwrap(),
            "--groups",
            "diffuse",
            "--clip-only",
            "--report",
            report.to_str().unwrap(),
        ])
        .status()
        .unwrap();

    assert!(status.success());
    assert!(out_dir.join("diffuse").join("probe-01.png").exists());

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report).unwrap()).unwrap();
    assert_eq!(report["total"], 1);
    assert_eq!(report["completed"], 1);
}

#[test]
fn cli_render_rejects_unknown_job_type() {
    let dir = PathBuf::from("target").join("cli_smoke").join("bad_task");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(dir.join("envmaps")).unwrap();

    let output = Command::new(bin())
        .args([
            "render",
            "--input-dir",
            dir.join("envmaps").to_str().unwrap(),
            "--output-dir",
            dir.join("renders").to_str().unwrap(),
            "--tasks",
            "mirror,chrome",
        ])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("chrome"));
}

#[test]
fn cli_render_rejects_standard_mode_before_invoking_blender() {
    let dir = PathBuf::from("target").join("cli_smoke").join("standard");
    let _ = std::fs::remove_dir_all(&dir);
    let envmaps = dir.join("envmaps");
    std::fs::create_dir_all(&envmaps).unwrap();
    std::fs::write(envmaps.join("env-01.exr"), b"").unwrap();

    let output = Command::new(bin())
        .args([
            "render",
            "--input-dir",
            envmaps.to_str().unwrap(),
            "--output-dir",
            dir.join("renders").to_str().unwrap(),
            "--mode",
            "standard",
            // Deliberately bogus executable: the unsupported-mode check must
            // fire before any spawn is attempted.
            "--blender-path",
            "/nonexistent/blender",
        ])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported"));
}
