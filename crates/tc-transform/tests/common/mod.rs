//! Fake transcoder fixtures.
//!
//! `ffmpeg` and `ffprobe` are replaced by `sh` scripts, so these tests only
//! run on unix. The fake ffprobe answers by file name: anything containing
//! `landscape` is a 1920x1080 source, files the fake ffmpeg wrote carry a
//! `FAKE-ENCODE` marker and report a 1080x1920 video stream, everything else
//! has no streams.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tc_core::config::TransformConfig;
use tc_transform::{FixedLocator, TranscoderPaths, TransformExecutor};

const LANDSCAPE_JSON: &str = concat!(
    r#"{"streams":[{"codec_type":"video","codec_name":"h264","width":1920,"height":1080},"#,
    r#"{"codec_type":"audio","codec_name":"aac"}],"format":{"duration":"61.500000"}}"#,
);
const VERTICAL_JSON: &str = concat!(
    r#"{"streams":[{"codec_type":"video","codec_name":"h264","width":1080,"height":1920}],"#,
    r#""format":{"duration":"45.000000"}}"#,
);
const EMPTY_JSON: &str = r#"{"streams":[],"format":{}}"#;

/// How the fake ffmpeg behaves once invoked.
#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    /// Write a marked file of this many bytes to the last argument.
    Write(usize),
    /// Exit 0 after creating a zero-byte output.
    Empty,
    /// Print to stderr and exit 1 after writing a partial file.
    Fail,
    /// Write a partial file and hang.
    Hang,
}

pub struct FakeTranscoder {
    pub dir: tempfile::TempDir,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl FakeTranscoder {
    pub fn new(behaviour: Behaviour) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();

        let ffmpeg = bin.join("ffmpeg");
        let ffprobe = bin.join("ffprobe");
        write_executable(&ffmpeg, &ffmpeg_script(dir.path(), behaviour));
        write_executable(&ffprobe, &ffprobe_script());

        Self {
            dir,
            ffmpeg,
            ffprobe,
        }
    }

    pub fn paths(&self) -> TranscoderPaths {
        TranscoderPaths {
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
        }
    }

    pub fn executor(&self) -> TransformExecutor {
        let config = TransformConfig {
            timeout: Duration::from_secs(30),
            ..Default::default()
        };
        TransformExecutor::new(Arc::new(FixedLocator(self.paths())), &config)
    }

    /// A fake source file in the work directory.
    pub fn source(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"source media").unwrap();
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Arguments of the last ffmpeg invocation, if any.
    pub fn recorded_args(&self) -> Option<Vec<String>> {
        std::fs::read_to_string(self.dir.path().join("ffmpeg.args"))
            .ok()
            .map(|s| s.lines().map(str::to_string).collect())
    }
}

fn ffmpeg_script(workdir: &Path, behaviour: Behaviour) -> String {
    let body = match behaviour {
        Behaviour::Write(bytes) => format!(
            "{{ echo FAKE-ENCODE; head -c {bytes} /dev/zero; }} > \"$out\"\n"
        ),
        Behaviour::Empty => ": > \"$out\"\n".to_string(),
        Behaviour::Fail => concat!(
            "echo partial > \"$out\"\n",
            "echo 'Invalid data found when processing input' >&2\n",
            "exit 1\n",
        )
        .to_string(),
        Behaviour::Hang => "echo FAKE-ENCODE > \"$out\"\nsleep 30\n".to_string(),
    };
    format!(
        "#!/bin/sh\n\
         if [ \"$1\" = \"-version\" ]; then echo 'ffmpeg version 6.1-fake'; exit 0; fi\n\
         printf '%s\\n' \"$@\" > '{args}'\n\
         for a in \"$@\"; do out=\"$a\"; done\n\
         {body}",
        args = workdir.join("ffmpeg.args").display(),
    )
}

fn ffprobe_script() -> String {
    format!(
        "#!/bin/sh\n\
         for a in \"$@\"; do f=\"$a\"; done\n\
         case \"$f\" in\n\
         *landscape*) echo '{LANDSCAPE_JSON}' ;;\n\
         *) if grep -q FAKE-ENCODE \"$f\" 2>/dev/null\n\
            then echo '{VERTICAL_JSON}'\n\
            else echo '{EMPTY_JSON}'; fi ;;\n\
         esac\n"
    )
}

pub fn write_executable(path: &Path, contents: &str) {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}
