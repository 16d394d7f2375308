use std::process::{Command, Output};

fn llc_flush(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_llc-flush"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run llc-flush")
}

#[test]
fn test_allocation_failure_exit_code() {
    // 64 TB cannot come from any huge page pool
    let out = llc_flush(&["--verify", "--size-mb", "67108864"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty(), "sweep must not start");
}

#[test]
fn test_verify_llc_region() {
    let out = llc_flush(&["--verify", "--alloc-strategy", "mmap"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8(out.stdout).expect("utf8 output");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 245760);
    for line in lines {
        let fields: Vec<&str> = line.split('|').collect();
        assert_eq!(fields.len(), 3, "{}", line);
        assert!(fields[0].trim().starts_with("Address\t: 0x"), "{}", line);
        assert!(fields[1].trim().starts_with("First Attempt : "), "{}", line);
        assert!(fields[2].trim().starts_with("Second Attempt : "), "{}", line);
    }
}

#[test]
fn test_no_output_without_verify() {
    let out = llc_flush(&["--alloc-strategy", "mmap", "--size-mb", "2"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(out.stdout.is_empty());
}

#[test]
fn test_invalid_line_size() {
    let out = llc_flush(&["--line-size", "48", "--alloc-strategy", "mmap"]);
    assert_eq!(out.status.code(), Some(2));
    let out = llc_flush(&["--size-mb", "0", "--alloc-strategy", "mmap"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_oversized_region_rejected() {
    // 2^44 MB overflows a 64 bit byte count
    let out = llc_flush(&["--alloc-strategy", "mmap", "--size-mb", "17592186044416"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(out.stdout.is_empty());
    let out = llc_flush(&["--verify", "--alloc-strategy", "mmap", "--size-mb", "17592186044417"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(out.stdout.is_empty());
    // first value past the mappable range
    let out = llc_flush(&["--alloc-strategy", "mmap", "--size-mb", "8796093022208"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_largest_region_fails_allocation() {
    // accepted by the parser, but no address space holds 8 EB
    let out = llc_flush(&["--verify", "--alloc-strategy", "mmap", "--size-mb", "8796093022207"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
}

#[test]
fn test_json_output() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("llc-flush-{}.json", std::process::id()));
    let path_str = path.to_str().expect("utf8 temp path");
    let out = llc_flush(&[
        "--verify",
        "--alloc-strategy",
        "mmap",
        "--size-mb",
        "1",
        "--line-size",
        "128",
        "--output",
        path_str,
    ]);
    assert_eq!(out.status.code(), Some(0));

    let record: serde_json::Value = serde_json::from_reader(std::fs::File::open(&path)?)?;
    std::fs::remove_file(&path)?;
    let timings = record["timings"].as_array().expect("timings array");
    assert_eq!(timings.len(), (1 << 20) / 128);
    assert_eq!(record["report"]["lines"], (1 << 20) / 128);
    assert_eq!(record["region_bytes"], 1 << 20);
    let base = record["base"].as_u64().expect("base address");
    for (i, timing) in timings.iter().enumerate() {
        assert_eq!(timing["addr"].as_u64(), Some(base + 128 * i as u64));
    }
    Ok(())
}
