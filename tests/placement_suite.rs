use std::path::Path;

use meshmap_tiles::canvas::DrawOp;
use meshmap_tiles::dump::PlacementDump;
use meshmap_tiles::geo::{LatLng, Rect, TileCoord};
use meshmap_tiles::layers::clients::{ClientBand, ClientLayer, layout_client_dots, start_angle};
use meshmap_tiles::layers::labels::ANCHORS;
use meshmap_tiles::model::{Location, Node, NodeSets};
use meshmap_tiles::text_metrics::FixedAdvanceMeasurer;
use meshmap_tiles::{Config, Dataset, MeshMap, TileLayer};

fn fixture() -> Dataset {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("hamburg.json");
    let input = std::fs::read_to_string(path).expect("fixture read failed");
    Dataset::from_json(&input).expect("fixture parse failed")
}

fn mesh_map(dataset: &Dataset) -> MeshMap {
    let mut map = MeshMap::with_measurer(Config::default(), Box::new(FixedAdvanceMeasurer::default()))
        .expect("default config is valid");
    map.set_data(dataset);
    map
}

fn tile_at(map: &MeshMap, pos: LatLng, z: u8) -> TileCoord {
    let size = f64::from(map.config().map.tile_size);
    let p = map.projection().project(pos, z);
    TileCoord::new((p.x / size) as u32, (p.y / size) as u32, z)
}

fn fill_texts(ops: &[DrawOp]) -> Vec<&str> {
    ops.iter()
        .filter_map(|op| match op {
            DrawOp::FillText { run, .. } => Some(run.text.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn labels_never_overlap_labels_or_icons() {
    let dataset = fixture();
    let map = mesh_map(&dataset);
    let config = map.config();
    let projection = map.projection();
    let zooms = config.map.label_zooms().unwrap();
    let placement = map.placement().unwrap();
    let icons: Vec<LatLng> = dataset
        .grouped()
        .in_priority_order()
        .filter_map(|(_, node)| node.position())
        .collect();

    assert!(!placement.labels().is_empty());
    for z in zooms.min..=zooms.max {
        let visible: Vec<(String, Rect)> = placement
            .labels()
            .iter()
            .filter(|label| label.is_visible_at(z))
            .map(|label| (label.node_id.clone(), label.rect_at(&projection, &zooms, z)))
            .collect();
        for (i, (a_id, a)) in visible.iter().enumerate() {
            for (b_id, b) in &visible[i + 1..] {
                assert!(!a.overlaps(b), "labels {a_id} and {b_id} overlap at zoom {z}");
            }
            for icon in &icons {
                let icon = Rect::around(projection.project(*icon, z), config.map.node_radius);
                assert!(!a.overlaps(&icon), "label {a_id} covers an icon at zoom {z}");
            }
        }
    }
}

#[test]
fn labels_show_from_their_min_zoom_upwards() {
    let dataset = fixture();
    let map = mesh_map(&dataset);
    let zooms = map.config().map.label_zooms().unwrap();
    let placement = map.placement().unwrap();

    for label in placement.labels() {
        assert!(zooms.contains(label.min_zoom));
        for z in zooms.min..=zooms.max {
            let canvas = map.labels().create_tile(tile_at(&map, label.position, z));
            let shown = fill_texts(canvas.ops()).contains(&label.text.as_str());
            assert_eq!(shown, z >= label.min_zoom, "{} at zoom {z}", label.text);
        }
        let below = map.labels().create_tile(tile_at(&map, label.position, zooms.min - 1));
        assert!(below.is_blank());
    }
}

#[test]
fn placement_is_deterministic() {
    let dataset = fixture();
    let summary = |map: &MeshMap| -> Vec<(String, String, u8)> {
        map.placement()
            .unwrap()
            .labels()
            .iter()
            .map(|label| (label.node_id.clone(), label.anchor.name(), label.min_zoom))
            .collect()
    };
    let mut first = mesh_map(&dataset);
    let second = mesh_map(&dataset);
    let before = summary(&first);
    assert_eq!(before, summary(&second));
    first.set_data(&dataset);
    assert_eq!(before, summary(&first));
    assert_eq!(first.placement().unwrap().dropped(), second.placement().unwrap().dropped());
}

#[test]
fn only_located_nodes_are_considered() {
    let dataset = fixture();
    let map = mesh_map(&dataset);
    let placement = map.placement().unwrap();
    let located = dataset.grouped().len();
    assert_eq!(located, 40);
    assert_eq!(placement.labels().len() + placement.dropped().len(), located);
    let texts: Vec<&str> = placement.labels().iter().map(|l| l.text.as_str()).collect();
    assert!(!texts.contains(&"ffhh-nowhere"));
    assert!(!texts.contains(&"ffhh-bogus"));
    assert!(map.clients().node_count() == 30);
}

#[test]
fn new_nodes_are_placed_first() {
    let dataset = fixture();
    let map = mesh_map(&dataset);
    let first_two: Vec<&str> = map.placement().unwrap().labels()[..2]
        .iter()
        .map(|label| label.node_id.as_str())
        .collect();
    let new_ids: Vec<&str> = dataset.nodes.new.iter().map(|n| n.node_id.as_str()).collect();
    assert_eq!(first_two, new_ids);
}

#[test]
fn every_client_gets_one_dot_in_band_order() {
    let dataset = fixture();
    let config = Config::default();
    for node in dataset.online_located() {
        let counts = node.client_counts();
        let dots = layout_client_dots(Default::default(), start_angle(&node.node_id), &counts, 10.0);
        assert_eq!(dots.len() as u32, counts.total);
        let bands: Vec<ClientBand> = dots.iter().map(|dot| dot.band).collect();
        let count = |band: ClientBand| bands.iter().filter(|b| **b == band).count() as u32;
        assert_eq!(count(ClientBand::Wifi24), counts.wifi24);
        assert_eq!(count(ClientBand::Wifi5), counts.wifi5);
        assert_eq!(count(ClientBand::Other), counts.other);
        assert!(bands.windows(2).all(|pair| {
            let rank = |band: ClientBand| match band {
                ClientBand::Wifi24 => 0,
                ClientBand::Wifi5 => 1,
                ClientBand::Other => 2,
            };
            rank(pair[0]) <= rank(pair[1])
        }));

        let mut layer = ClientLayer::new(&config).unwrap();
        layer.set_data(&Dataset {
            nodes: NodeSets {
                online: vec![node.clone()],
                ..NodeSets::default()
            },
            ..Dataset::default()
        });
        let p = config.map.projection().project(node.position().unwrap(), 17);
        let canvas = layer.create_tile(TileCoord::new((p.x / 256.0) as u32, (p.y / 256.0) as u32, 17));
        assert_eq!(canvas.ops().len() as u32, counts.total, "{}", node.node_id);
    }
}

#[test]
fn isolated_node_is_labelled_right_of_its_icon() {
    let mut node = Node::new("c04a00dd0001", "lonely");
    node.location = Some(Location {
        latitude: -33.86,
        longitude: 151.2,
    });
    let map = mesh_map(&Dataset {
        nodes: NodeSets {
            offline: vec![node],
            ..NodeSets::default()
        },
        ..Dataset::default()
    });
    let label = map.placement().unwrap().get("c04a00dd0001").unwrap();
    assert_eq!(label.anchor, ANCHORS[0]);
    assert_eq!(label.min_zoom, map.config().map.label_zoom);
}

#[test]
fn markers_and_links_follow_node_state() {
    let dataset = fixture();
    let map = mesh_map(&dataset);
    // One lost node is older than the maximum age.
    assert_eq!(map.markers().markers().len(), 39);
    let link_ids: Vec<&str> = map.markers().links().iter().map(|l| l.link_id.as_str()).collect();
    assert_eq!(link_ids.len(), 29);
    assert!(!link_ids.contains(&"vpn-link"));
    assert!(!link_ids.contains(&"no-distance"));
}

#[test]
fn placement_dump_lists_every_label() {
    let dataset = fixture();
    let map = mesh_map(&dataset);
    let placement = map.placement().unwrap();
    let dump = PlacementDump::from_placement(placement);
    assert_eq!(dump.labels.len(), placement.labels().len());
    let json: serde_json::Value = serde_json::from_str(&dump.to_json().unwrap()).unwrap();
    assert_eq!(json["labels"][0]["node_id"], dump.labels[0].node_id.as_str());
    assert!(json["margin"].as_f64().unwrap() > 16.0);
}

#[test]
fn composed_tiles_render_to_svg() {
    let dataset = fixture();
    let map = mesh_map(&dataset);
    let anchor = dataset.nodes.online[0].position().unwrap();
    let tile = tile_at(&map, anchor, 16);
    let svg = map.tile_canvas(tile).to_svg();
    assert!(svg.contains("<svg"));
    assert!(svg.contains("</svg>"));
    assert!(svg.contains("<circle"));
}
