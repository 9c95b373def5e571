// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of this software
// and associated documentation files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all copies or
// substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

extern crate docopt;
extern crate env_logger;
extern crate hlbsp;
#[macro_use]
extern crate serde_derive;

use std::fs;
use std::path::Path;
use std::process::exit;

use hlbsp::{
    client::render::HeadlessBackend,
    common::{
        bsp::{self, LoadContext, LoadOptions},
        model::ModelRegistry,
        wad::WadSet,
    },
};

use docopt::Docopt;

#[derive(Deserialize)]
struct Args {
    arg_map: String,
    flag_wad_dir: Option<String>,
    flag_subdivide: Option<f32>,
    flag_keep_tjunctions: bool,
    flag_dot: bool,
    flag_h: bool,
    flag_help: bool,
    flag_version: bool,
}

const USAGE: &'static str = "
Usage: bsp-info [options] <map>

Options:
    --wad-dir <dir>      Directory to load texture archives from. Defaults to the map's directory.
    --subdivide <size>   Grid size for sky and liquid subdivision.
    --keep-tjunctions    Keep colinear polygon vertices.
    --dot                Print the draw tree as a Graphviz graph instead of a summary.

    -h, --help           Show this message and exit.
        --version        Print version information and exit.
";

const VERSION: &'static str = "
bsp-info 0.1
Copyright © 2018 Cormac O'Brien
Released under the terms of the MIT License
";

fn main() {
    env_logger::init();

    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    if args.flag_help || args.flag_h {
        println!("{}", USAGE);
        exit(0);
    }

    if args.flag_version {
        println!("{}", VERSION);
        exit(0);
    }

    let data = match fs::read(&args.arg_map) {
        Ok(d) => d,
        Err(why) => {
            println!("Couldn't open {}: {}", &args.arg_map, why);
            exit(1);
        }
    };

    let wad_dir = match args.flag_wad_dir {
        Some(ref d) => Path::new(d).to_owned(),
        None => Path::new(&args.arg_map)
            .parent()
            .map(|p| p.to_owned())
            .unwrap_or_default(),
    };

    let mut archives = WadSet::new(wad_dir);
    let mut backend = HeadlessBackend::new();
    let mut options = LoadOptions::default();
    if let Some(size) = args.flag_subdivide {
        options.subdivide_size = size;
    }
    options.keep_tjunctions = args.flag_keep_tjunctions;

    let mut ctx = LoadContext {
        archives: &mut archives,
        renderer: &mut backend,
        options,
    };

    let mut registry = ModelRegistry::new();
    let world = match bsp::load_brush_model(&mut registry, &args.arg_map, &data, &mut ctx) {
        Ok(w) => w,
        Err(why) => {
            println!("Couldn't load {}: {}", &args.arg_map, why);
            exit(1);
        }
    };

    let bsp_data = match registry.get(world).brush() {
        Some(b) => b.bsp_data().clone(),
        None => {
            println!("{} holds no world model", &args.arg_map);
            exit(1);
        }
    };

    if args.flag_dot {
        println!("{}", bsp_data.gen_dot_graph());
        return;
    }

    let polygons: usize = bsp_data
        .surfaces()
        .iter()
        .map(|s| s.polygons().count())
        .sum();
    let missing = bsp_data.textures().iter().filter(|t| t.is_none()).count();

    println!("{}", &args.arg_map);
    println!("  planes:        {}", bsp_data.planes().len());
    println!("  vertices:      {}", bsp_data.vertices().len());
    println!("  nodes:         {}", bsp_data.nodes().len());
    println!("  leaves:        {}", bsp_data.leaves().len());
    println!("  surfaces:      {}", bsp_data.surfaces().len());
    println!("  polygons:      {}", polygons);
    println!(
        "  textures:      {} ({} unresolved)",
        bsp_data.textures().len(),
        missing
    );
    println!("  lightmaps:     {}", bsp_data.lightmap_count());
    println!("  models:        {}", registry.len());
    println!("  texture wads:  {}", archives.names().collect::<Vec<_>>().join(", "));
    println!("  uploaded:      {} vertices", backend.vertex_count());
}
