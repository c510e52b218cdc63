use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str;

use log::{debug, info, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xz::bufread::XzDecoder;

use crate::config::UserConfig;
use crate::data::osm::{Node, OsmId, Tags, Way};
use crate::data::{Bounds, MapData};
use crate::errors::{Error, Result};
use crate::geo::Projector;

use super::{write_archive, Etl};

pub const ETL_NAME: &str = "parse_osm";
pub const OUTPUT_FILE_NAME: &str = "map_data.rkyv";

enum ParserState {
    Top,
    Node(usize),
    Way(usize),
    /// Inside an element whose children are ignored: relations and
    /// entities that failed to parse.
    Skip,
}

pub struct ParseOsmEtl<'a> {
    config: &'a UserConfig,
}

fn attribute_str<'v>(value: &'v [u8]) -> Result<&'v str> {
    Ok(str::from_utf8(value)?)
}

impl ParseOsmEtl<'_> {
    pub fn new(config: &UserConfig) -> ParseOsmEtl {
        ParseOsmEtl {
            config
        }
    }

    fn parse_header(el: &BytesStart, map: &mut MapData) -> Result<()> {
        for attribute in el.attributes() {
            let attribute = attribute?;
            match attribute.key.as_ref() {
                b"version" => map.version = attribute.unescape_value()?.to_string(),
                b"generator" => map.generator = attribute.unescape_value()?.to_string(),
                _ => (),
            }
        }
        Ok(())
    }

    fn parse_bounds(el: &BytesStart) -> Result<Bounds> {
        let mut bounds = [None; 4];
        for attribute in el.attributes() {
            let attribute = attribute?;
            let slot = match attribute.key.as_ref() {
                b"minlat" => 0,
                b"minlon" => 1,
                b"maxlat" => 2,
                b"maxlon" => 3,
                _ => continue,
            };
            bounds[slot] = Some(attribute_str(&attribute.value)?.trim().parse::<f64>()?);
        }
        match bounds {
            [Some(min_lat), Some(min_lon), Some(max_lat), Some(max_lon)] => Ok(Bounds {
                min_lat,
                min_lon,
                max_lat,
                max_lon,
            }),
            _ => Err(Error::parse("bounds element is missing a coordinate")),
        }
    }

    fn parse_node(el: &BytesStart) -> Result<Node> {
        let mut id: Option<OsmId> = None;
        let mut lat: Option<f64> = None;
        let mut lon: Option<f64> = None;
        let mut ele = 0.0;

        for attribute in el.attributes() {
            let attribute = attribute?;
            match attribute.key.as_ref() {
                b"id" => id = Some(attribute_str(&attribute.value)?.parse()?),
                b"lat" => lat = Some(attribute_str(&attribute.value)?.trim().parse()?),
                b"lon" => lon = Some(attribute_str(&attribute.value)?.trim().parse()?),
                b"ele" => ele = attribute_str(&attribute.value)?.trim().parse()?,
                _ => (),
            }
        }

        Ok(Node {
            id: id.ok_or("node without id")?,
            lat: lat.ok_or("node without lat")?,
            lon: lon.ok_or("node without lon")?,
            ele,
            ..Default::default()
        })
    }

    fn parse_way(el: &BytesStart) -> Result<Way> {
        for attribute in el.attributes() {
            let attribute = attribute?;
            if attribute.key.as_ref() == b"id" {
                return Ok(Way {
                    id: attribute_str(&attribute.value)?.parse()?,
                    ..Default::default()
                });
            }
        }
        Err("way without id".into())
    }

    fn parse_tag(el: &BytesStart, tags: &mut Tags) -> Result<()> {
        let mut key = None;
        let mut value = None;
        for attribute in el.attributes() {
            let attribute = attribute?;
            match attribute.key.as_ref() {
                b"k" => key = Some(attribute.unescape_value()?.to_string()),
                b"v" => value = Some(attribute.unescape_value()?.to_string()),
                _ => (),
            }
        }
        match (key, value) {
            (Some(key), Some(value)) => {
                tags.insert(key, value);
                Ok(())
            },
            _ => Err("tag without k or v".into()),
        }
    }

    fn parse_node_ref(el: &BytesStart, map: &MapData) -> Result<Option<usize>> {
        for attribute in el.attributes() {
            let attribute = attribute?;
            if attribute.key.as_ref() == b"ref" {
                let id: OsmId = attribute_str(&attribute.value)?.parse()?;
                return Ok(map.node_index.get(&id).copied());
            }
        }
        Err("nd without ref".into())
    }

    /// Opens an element. Returns the state for its children.
    fn start_element(el: &BytesStart, map: &mut MapData, state: &ParserState) -> Result<Option<ParserState>> {
        match (state, el.name().as_ref()) {
            (_, b"osm") => {
                Self::parse_header(el, map)?;
                Ok(None)
            },
            (_, b"bounds") => {
                map.bounds = Self::parse_bounds(el)?;
                Ok(Some(ParserState::Top))
            },
            (ParserState::Top, b"node") => {
                let node = match Self::parse_node(el) {
                    Ok(node) => node,
                    Err(err) => {
                        warn!(err = err.message.as_str(); "Skipping malformed node");
                        return Ok(Some(ParserState::Skip));
                    },
                };
                let idx = map.nodes.len();
                if map.node_index.insert(node.id, idx).is_some() {
                    warn!(node_id = node.id; "Duplicate node id, the later node wins");
                }
                map.nodes.push(node);
                Ok(Some(ParserState::Node(idx)))
            },
            (ParserState::Top, b"way") => match Self::parse_way(el) {
                Ok(way) => {
                    map.ways.push(way);
                    Ok(Some(ParserState::Way(map.ways.len() - 1)))
                },
                Err(err) => {
                    warn!(err = err.message.as_str(); "Skipping malformed way");
                    Ok(Some(ParserState::Skip))
                },
            },
            (ParserState::Top, b"relation") => Ok(Some(ParserState::Skip)),
            (ParserState::Node(idx), b"tag") => {
                if let Err(err) = Self::parse_tag(el, &mut map.nodes[*idx].tags) {
                    warn!(node_id = map.nodes[*idx].id, err = err.message.as_str(); "Ignoring malformed tag");
                }
                Ok(None)
            },
            (ParserState::Way(idx), b"tag") => {
                if let Err(err) = Self::parse_tag(el, &mut map.ways[*idx].tags) {
                    warn!(way_id = map.ways[*idx].id, err = err.message.as_str(); "Ignoring malformed tag");
                }
                Ok(None)
            },
            (ParserState::Way(idx), b"nd") => {
                match Self::parse_node_ref(el, map)? {
                    Some(node) => map.ways[*idx].nodes.push(node),
                    None => debug!(way_id = map.ways[*idx].id; "Way references a node outside the extract"),
                }
                Ok(None)
            },
            _ => Ok(None),
        }
    }

    /// Parses a complete OSM XML document and projects every node.
    pub fn parse<R: BufRead>(reader: &mut Reader<R>, config: &UserConfig) -> Result<MapData> {
        let mut buf = Vec::new();
        let mut map = MapData::default();
        let mut state = ParserState::Top;
        let mut has_bounds = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Err(e) => return Err(e.into()),
                Ok(Event::Eof) => break,
                Ok(Event::Text(_e)) => return Err("Didn't expect to see Text in OSM file.".into()),
                Ok(Event::Start(e)) => {
                    has_bounds |= e.name().as_ref() == b"bounds";
                    if let Some(next) = Self::start_element(&e, &mut map, &state)? {
                        state = next;
                    }
                },
                Ok(Event::Empty(e)) => {
                    has_bounds |= e.name().as_ref() == b"bounds";
                    // Self closing nodes and ways have no children to route.
                    Self::start_element(&e, &mut map, &state)?;
                },
                Ok(Event::End(e)) => {
                    if matches!(e.name().as_ref(), b"node" | b"way" | b"relation") {
                        state = ParserState::Top;
                    }
                },
                Ok(_) => (),
            }
            buf.clear();
        }

        if map.version.is_empty() {
            return Err(Error::parse("missing <osm version>"));
        }
        if !has_bounds {
            return Err(Error::parse("missing <bounds>"));
        }

        let settings = &config.settings;
        let projector = Projector::from_bounds(&map.bounds, settings.use_origin, settings.unit_scale);
        for node in map.nodes.iter_mut() {
            if let Some(ele) = node.tags.get("ele").and_then(|ele| ele.trim().parse::<f64>().ok()) {
                node.ele = ele;
            }
            node.co = projector.project(node.lat, node.lon, node.ele);
        }
        map.dimensions = projector.dimensions(&map.bounds);
        map.link_ways();

        Ok(map)
    }

    fn create_osm_reader(&self) -> Result<Reader<Box<dyn BufRead>>> {
        let path = Path::new(&self.config.data_path);
        let file_reader = BufReader::new(fs::File::open(path)?);
        let reader: Box<dyn BufRead> = if path.extension().is_some_and(|ext| ext == "xz") {
            Box::new(BufReader::new(XzDecoder::new(file_reader)))
        } else {
            Box::new(file_reader)
        };
        let mut reader = Reader::from_reader(reader);
        reader.trim_text(true);

        Ok(reader)
    }
}

impl Etl for ParseOsmEtl<'_> {
    type Input = Reader<Box<dyn BufRead>>;
    type Output = MapData;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn output_files(&self) -> &[&str] {
        &[OUTPUT_FILE_NAME]
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        self.create_osm_reader()
    }

    fn transform(&mut self, mut input: Self::Input) -> Result<Self::Output> {
        let map = Self::parse(&mut input, self.config)?;
        info!(
            etl_name = ETL_NAME,
            nodes = map.nodes.len(),
            ways = map.ways.len(),
            width = map.dimensions[0],
            height = map.dimensions[1];
            "Parsed map data"
        );
        Ok(map)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        write_archive(&dir.join(OUTPUT_FILE_NAME), &output)
    }
}
