//! End-to-end tests: project files on disk through to written outputs.

use image::{Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use convimg::appvar::header::{checksum, HEADER_SIZE, MAGIC};
use convimg::config::{load_project, ConfigError, CONFIG_FILE};
use convimg::pipeline::{Phase, Pipeline, PipelineError};

// ============================================================================
// Test Utilities
// ============================================================================

const COLORS: [[u8; 4]; 4] = [
    [255, 0, 0, 255],
    [0, 255, 0, 255],
    [0, 0, 255, 255],
    [255, 255, 255, 255],
];

/// 16x16 image made of four 8x8 quadrants of distinct colors.
fn write_quadrants(path: &Path) {
    RgbaImage::from_fn(16, 16, |x, y| Rgba(COLORS[((y / 8) * 2 + x / 8) as usize]))
        .save(path)
        .unwrap();
}

fn write_project(dir: &Path, toml: &str) -> PathBuf {
    let path = dir.join(CONFIG_FILE);
    fs::write(&path, toml).unwrap();
    path
}

fn run(config: &Path, jobs: usize) -> Vec<PathBuf> {
    let project = load_project(Some(config)).unwrap();
    Pipeline::new(project).with_jobs(jobs).run().unwrap().files
}

fn u16_at(bytes: &[u8], offset: usize) -> usize {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]]) as usize
}

fn u24_at(bytes: &[u8], offset: usize) -> usize {
    bytes[offset] as usize | (bytes[offset + 1] as usize) << 8 | (bytes[offset + 2] as usize) << 16
}

const APPVAR_PROJECT: &str = r#"
[[palettes]]
name = "pal"
max-entries = 4

[[converts]]
name = "sprites"
palette = "pal"
images = ["gfx/*.png"]

[[outputs]]
type = "appvar"
name = "TESTVAR"
directory = "out"
header-string = "HDR"
lut-entries = true
palettes = ["pal"]
converts = ["sprites"]
"#;

// ============================================================================
// AppVar
// ============================================================================

#[test]
fn test_appvar_with_lut() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("gfx")).unwrap();
    write_quadrants(&temp.path().join("gfx").join("tile.png"));
    let config = write_project(temp.path(), APPVAR_PROJECT);

    let files = run(&config, 2);
    let out = temp.path().join("out");
    assert_eq!(files, vec![out.join("TESTVAR.8xv"), out.join("TESTVAR.c"), out.join("TESTVAR.h")]);

    let bytes = fs::read(out.join("TESTVAR.8xv")).unwrap();
    // header "HDR" + 3 LUT entries of 3 bytes + image (2 + 256) + palette (4 * 2)
    let data_len = 3 + 9 + 258 + 8;
    assert_eq!(bytes.len(), HEADER_SIZE + data_len + 2);
    assert_eq!(&bytes[..11], &MAGIC);
    assert_eq!(&bytes[0x3C..0x44], b"TESTVAR\0");
    assert_eq!(bytes[0x45], 0x80);
    assert_eq!(u16_at(&bytes, 0x48), data_len);
    assert_eq!(u16_at(&bytes, 0x35), data_len + 19);

    let body = &bytes[..bytes.len() - 2];
    assert_eq!(u16_at(&bytes, bytes.len() - 2), checksum(body) as usize);

    let data = &bytes[HEADER_SIZE..HEADER_SIZE + data_len];
    assert_eq!(&data[..3], b"HDR");
    let lut = &data[3..];
    assert_eq!(u24_at(lut, 0), 2);
    assert_eq!(u24_at(lut, 3), 9);
    assert_eq!(u24_at(lut, 6), 9 + 258);

    // Image: width, height, then every pixel indexes one of four entries
    let image = &lut[9..9 + 258];
    assert_eq!(&image[..2], &[16, 16]);
    assert!(image[2..].iter().all(|&i| i < 4));
    assert_eq!(image[2], image[9]);
    assert_ne!(image[2], image[10]);

    let source = fs::read_to_string(out.join("TESTVAR.c")).unwrap();
    assert!(source.contains("if (lut[0] != 2)"));
    let header = fs::read_to_string(out.join("TESTVAR.h")).unwrap();
    assert!(header.contains("#define tile_width 16"));
    assert!(header.contains("unsigned char TESTVAR_init(void);"));
}

#[test]
fn test_compressed_appvar_round_trips() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("gfx")).unwrap();
    write_quadrants(&temp.path().join("gfx").join("tile.png"));
    let config = write_project(
        temp.path(),
        &APPVAR_PROJECT.replace(
            "lut-entries = true",
            "lut-entries = true\ncompress = \"lz4\"\nsource-format = \"none\"",
        ),
    );

    let files = run(&config, 1);
    assert_eq!(files, vec![temp.path().join("out").join("TESTVAR.8xv")]);

    let bytes = fs::read(&files[0]).unwrap();
    let stored = u16_at(&bytes, 0x48);
    let packed = &bytes[HEADER_SIZE..HEADER_SIZE + stored];
    let data = lz4_flex::block::decompress(packed, 278).unwrap();
    assert_eq!(&data[..3], b"HDR");
    assert_eq!(u24_at(&data, 3), 2);
    assert!(stored < 278);
}

// ============================================================================
// Source outputs
// ============================================================================

#[test]
fn test_c_output_tree() {
    let temp = TempDir::new().unwrap();
    write_quadrants(&temp.path().join("ball.png"));
    write_quadrants(&temp.path().join("map.png"));
    let config = write_project(
        temp.path(),
        r#"
[[converts]]
name = "sprites"
palette = "xlibc"
images = ["ball.png"]
tilesets = { tile-width = 8, tile-height = 8, images = ["map.png"] }

[[outputs]]
type = "c"
directory = "src/gfx"
palettes = ["xlibc"]
converts = ["sprites"]
"#,
    );

    let files = run(&config, 4);
    let out = temp.path().join("src").join("gfx");
    let names: Vec<String> = files
        .iter()
        .map(|f| f.strip_prefix(&out).unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["ball.c", "gfx.h", "map.c", "sprites.h", "xlibc.c", "xlibc.h"]);

    let palette = fs::read_to_string(out.join("xlibc.h")).unwrap();
    assert!(palette.contains("#define sizeof_xlibc 512"));
    let header = fs::read_to_string(out.join("sprites.h")).unwrap();
    assert!(header.contains("#define ball_width 16"));
    assert!(header.contains("#define map_num_tiles 4"));
    assert!(header.contains("gfx_sprite_t"));
    let include = fs::read_to_string(out.join("gfx.h")).unwrap();
    assert!(include.contains("#include \"sprites.h\""));
    assert!(include.contains("#include \"xlibc.h\""));
}

#[test]
fn test_output_is_deterministic_across_job_counts() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("gfx")).unwrap();
    for i in 0..6 {
        let path = temp.path().join("gfx").join(format!("img{}.png", i));
        RgbaImage::from_fn(8, 8, |x, y| Rgba([(x * 30) as u8, (y * 30) as u8, (i * 40) as u8, 255]))
            .save(path)
            .unwrap();
    }
    let config = write_project(temp.path(), APPVAR_PROJECT);

    let serial: Vec<Vec<u8>> = run(&config, 1).iter().map(|f| fs::read(f).unwrap()).collect();
    let parallel: Vec<Vec<u8>> = run(&config, 8).iter().map(|f| fs::read(f).unwrap()).collect();
    assert_eq!(serial, parallel);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_config_errors_are_collected() {
    let temp = TempDir::new().unwrap();
    let config = write_project(
        temp.path(),
        r#"
[[converts]]
name = "a"
style = "rlet"
bpp = 2
images = ["a.png"]

[[outputs]]
type = "appvar"
name = "TOOLONGNAME"
"#,
    );

    match load_project(Some(config.as_path())) {
        Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 3, "{:?}", errors),
        other => panic!("expected validation errors, got {:?}", other),
    }
}

#[test]
fn test_oversized_appvar_fails_output_phase() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("gfx")).unwrap();
    // Two 255x255 direct images are far beyond the AppVar limit
    for name in ["a.png", "b.png"] {
        RgbaImage::from_fn(255, 255, |x, y| Rgba([x as u8, y as u8, 7, 255]))
            .save(temp.path().join("gfx").join(name))
            .unwrap();
    }
    let config = write_project(
        temp.path(),
        r#"
[[converts]]
name = "big"
style = "direct"
images = ["gfx/*.png"]

[[outputs]]
type = "appvar"
name = "BIG"
directory = "out"
converts = ["big"]
"#,
    );

    let project = load_project(Some(config.as_path())).unwrap();
    let err = Pipeline::new(project).with_jobs(2).run().unwrap_err();
    assert!(matches!(err, PipelineError::PhaseFailed(Phase::Outputs)));
    assert!(!temp.path().join("out").join("BIG.8xv").exists());
}
