use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const BUFSIZE: usize = 8 * 1024 * 1024;

pub fn open_file<P: AsRef<Path>>(path: P) -> io::Result<File> {
    File::open(&path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            io::Error::new(e.kind(), format!("File not found: {:?}", path.as_ref()))
        } else {
            e
        }
    })
}

pub fn is_gzipped(file: &mut File) -> io::Result<bool> {
    let mut buffer = [0; 2];
    let n = file.read(&mut buffer)?;
    file.rewind()?;
    Ok(n == 2 && buffer == [0x1F, 0x8B])
}

/// Opens a file for reading, transparently decoding gzip when the magic
/// bytes match.
pub fn dyn_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Read + Send>> {
    let mut file = open_file(path)?;
    if is_gzipped(&mut file)? {
        Ok(Box::new(BufReader::with_capacity(
            BUFSIZE,
            GzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(BUFSIZE, file)))
    }
}

/// Creates an output file, gzip-compressed unless `plain` is set.
pub fn dyn_writer<P: AsRef<Path>>(path: P, plain: bool) -> io::Result<Box<dyn Write + Send>> {
    let file = File::create(path)?;
    if plain {
        Ok(Box::new(BufWriter::with_capacity(BUFSIZE, file)))
    } else {
        Ok(Box::new(BufWriter::with_capacity(
            BUFSIZE,
            GzEncoder::new(file, Compression::default()),
        )))
    }
}

/// Expands the given paths into .unik files, walking directories.
pub fn find_unik_files<P: AsRef<Path>>(paths: &[P]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            files.extend(
                WalkDir::new(path)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| {
                        e.path()
                            .file_name()
                            .and_then(|name| name.to_str())
                            .map(|name| name.ends_with(".unik"))
                            .unwrap_or(false)
                    })
                    .map(|e| e.path().to_path_buf()),
            );
        } else {
            files.push(path.to_path_buf());
        }
    }
    files.sort_unstable();
    files
}

/// Finds numbered files `{prefix}_{n}{suffix}` in a directory, sorted by
/// their number.
pub fn find_numbered_files(
    directory: &Path,
    prefix: &str,
    suffix: &str,
) -> io::Result<Vec<PathBuf>> {
    let pattern = format!(r"{}_(\d+){}$", regex::escape(prefix), regex::escape(suffix));
    let re = Regex::new(&pattern).expect("Invalid regex pattern");

    let mut entries: Vec<(usize, PathBuf)> = std::fs::read_dir(directory)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let num = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| re.captures(name))
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<usize>().ok())?;
            Some((num, path))
        })
        .collect();

    entries.sort_by_key(|(num, _)| *num);
    Ok(entries.into_iter().map(|(_, path)| path).collect())
}

/// Parses sizes like `100M`, `4G` or `8192` into bytes.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let (num, factor) = match s.chars().last() {
        Some('K') | Some('k') => (&s[..s.len() - 1], 1usize << 10),
        Some('M') | Some('m') => (&s[..s.len() - 1], 1 << 20),
        Some('G') | Some('g') => (&s[..s.len() - 1], 1 << 30),
        _ => (s, 1),
    };
    num.parse::<usize>()
        .map(|n| n * factor)
        .map_err(|_| format!("invalid size: {}", s))
}

#[cfg(unix)]
use libc::{getrlimit, rlimit, setrlimit, RLIMIT_NOFILE};

#[cfg(unix)]
pub fn get_file_limit() -> usize {
    let mut limits = rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let result = unsafe { getrlimit(RLIMIT_NOFILE, &mut limits) };
    if result == 0 {
        limits.rlim_cur as usize
    } else {
        0
    }
}

#[cfg(unix)]
pub fn set_fd_limit(new_limit: u64) -> io::Result<()> {
    let rlim = rlimit {
        rlim_cur: new_limit,
        rlim_max: new_limit,
    };
    let ret = unsafe { setrlimit(RLIMIT_NOFILE, &rlim) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(windows)]
pub fn get_file_limit() -> usize {
    8192
}

#[cfg(windows)]
pub fn set_fd_limit(_new_limit: u64) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("8192").unwrap(), 8192);
        assert_eq!(parse_size("4K").unwrap(), 4096);
        assert_eq!(parse_size("100M").unwrap(), 100 << 20);
        assert_eq!(parse_size("2G").unwrap(), 2 << 30);
        assert!(parse_size("abc").is_err());
    }

    #[test]
    fn test_numbered_file_order() {
        let dir = tempfile::tempdir().unwrap();
        for n in [10usize, 2, 1] {
            std::fs::write(dir.path().join(format!("chunk_{}.unik", n)), b"").unwrap();
        }
        std::fs::write(dir.path().join("other.unik"), b"").unwrap();
        let files = find_numbered_files(dir.path(), "chunk", ".unik").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["chunk_1.unik", "chunk_2.unik", "chunk_10.unik"]);
    }
}
