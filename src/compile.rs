use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::analyze;
use crate::ast::{Executable, Item};
use crate::elf;
use crate::encode;
use crate::error::{Error, Result};
use crate::lexer;
use crate::link::{LinkMap, Linked, Linker};
use crate::parser::Parser;

/// The result of a successful assembly: where the executable was written
/// and the resolved layout.
#[derive(Debug)]
pub struct Artifact {
    pub output_path: PathBuf,
    pub map: LinkMap,
}

pub fn parse_items(source: &str) -> Result<Vec<Item>> {
    let tokens = lexer::lex(source)?;
    Parser::new(tokens).parse_items()
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Run the whole pipeline over in-memory sources: parse, analyze, encode,
/// register, and link every item from every source file.
pub fn link_sources(exec: &Executable, sources: &[String]) -> Result<Linked> {
    let mut linker = Linker::new();
    linker.set_code_start(exec.code_address);
    linker.set_entry(&exec.entry);
    linker.set_addresses(exec.addresses.clone());

    for source in sources {
        for item in parse_items(source)? {
            match item {
                Item::Function(mut func) => {
                    analyze::analyze_function(&mut func)?;
                    let code = encode::encode_function(&func.insts)?;
                    linker.add_function(&func.name, code)?;
                }
                Item::Uninit(mut data) => {
                    analyze::analyze_uninit(&mut data)?;
                    linker.add_object(&data.name, data.size)?;
                }
                Item::Executable(_) => return Err(Error::NestedManifest),
            }
        }
    }

    linker.finalize()
}

/// Assemble and link per the manifest found at `manifest_path`. Source
/// files and the output path are resolved relative to the manifest's
/// directory. Nothing is written unless every stage succeeds.
pub fn compile(manifest_path: &Path) -> Result<Artifact> {
    let manifest_src = read_source(manifest_path)?;
    let mut exec = parse_items(&manifest_src)?
        .into_iter()
        .find_map(|item| match item {
            Item::Executable(exec) => Some(exec),
            _ => None,
        })
        .ok_or_else(|| Error::NoManifest(manifest_path.display().to_string()))?;
    analyze::analyze_executable(&mut exec)?;

    let dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    let mut sources = Vec::with_capacity(exec.files.len());
    for file in &exec.files {
        sources.push(read_source(&dir.join(file))?);
    }

    let linked = link_sources(&exec, &sources)?;
    let image = elf::build_image(&linked);
    let map = linked.map();

    let output_path = dir.join(&exec.output_path);
    fs::write(&output_path, &image).map_err(|source| Error::Io {
        path: output_path.display().to_string(),
        source,
    })?;
    info!(path = %output_path.display(), bytes = image.len(), "wrote executable");

    Ok(Artifact { output_path, map })
}
