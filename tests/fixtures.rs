//! Walks `tests/fixtures/*.itmo`, running each script and diffing its
//! captured stdout against the paired `*.expected` file.

use itmoscript::interpret;
use std::cell::RefCell;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;
use walkdir::WalkDir;

#[derive(Clone, Default)]
struct CapturedOutput(Rc<RefCell<Vec<u8>>>);

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn fixtures_match_expected_output() {
    let fixtures_dir: PathBuf = [env!("CARGO_MANIFEST_DIR"), "tests", "fixtures"].iter().collect();

    let scripts: Vec<PathBuf> = WalkDir::new(&fixtures_dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            (path.extension().and_then(|e| e.to_str()) == Some("itmo")).then(|| path.to_path_buf())
        })
        .collect();

    assert!(!scripts.is_empty(), "no .itmo fixtures found under {}", fixtures_dir.display());

    for script in scripts {
        let expected_path = script.with_extension("expected");
        let source = std::fs::read_to_string(&script).unwrap_or_else(|e| panic!("reading {}: {e}", script.display()));
        let expected = std::fs::read_to_string(&expected_path).unwrap_or_else(|e| panic!("reading {}: {e}", expected_path.display()));

        let out = CapturedOutput::default();
        match interpret(&source, io::empty(), out.clone(), Some(1)) {
            Ok(_) => {
                let actual = String::from_utf8(out.0.borrow().clone()).unwrap_or_else(|e| panic!("{}: non-utf8 output: {e}", script.display()));
                assert_eq!(actual, expected, "{} produced unexpected stdout", script.display());
            }
            Err(diagnostic) => panic!("{} failed to run: {}", script.display(), diagnostic.render(false)),
        }
    }
}
