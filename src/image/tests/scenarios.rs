//! End-to-end scenarios over the public kiln-image API.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use kiln_core::{ConfigFile, Descriptor, Hash, Manifest, MediaType, Platform, Stamper};
use kiln_image::{
    as_oci_image, from_parts, read_image, update_config, validate_image, write_image, ImageIndex,
    ImageIndexView, ImageParts, ImageView, IntermediateLayout, LayerParts, OverrideOptions,
    ValidateOptions,
};
use rand::RngCore;
use tempfile::TempDir;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn override_config(base: Option<ConfigFile>, opts: &OverrideOptions) -> ConfigFile {
    update_config(base.unwrap_or_default(), opts, &Stamper::default()).unwrap()
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

fn tarball(name: &str, contents: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, contents).unwrap();
    builder.into_inner().unwrap()
}

/// Write a layer blob plus its diff-id file, returning the parts.
fn write_layer(dir: &Path, name: &str, compress: bool) -> LayerParts {
    let tar_bytes = tarball(name, &random_bytes(1024));
    let diff_id = Hash::sha256(&tar_bytes);
    let (blob, file_name) = if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        (encoder.finish().unwrap(), format!("{}.tar.gz", name))
    } else {
        (tar_bytes, format!("{}.tar", name))
    };
    let compressed = dir.join(file_name);
    let diff_id_file = dir.join(format!("{}.diffid", name));
    std::fs::write(&compressed, blob).unwrap();
    std::fs::write(&diff_id_file, diff_id.hex()).unwrap();
    LayerParts {
        compressed,
        diff_id_file,
        digest_file: None,
    }
}

/// A random single-layer image assembled from parts under `dir`.
fn random_image(dir: &Path, platform: &str) -> Arc<dyn ImageView> {
    let parts = vec![write_layer(dir, &format!("layer-{}", platform.replace('/', "-")), true)];
    let config = ConfigFile {
        os: "linux".to_string(),
        architecture: platform.split('/').nth(1).unwrap_or("amd64").to_string(),
        ..Default::default()
    };
    let config_path: PathBuf = dir.join(format!("config-{}.json", platform.replace('/', "-")));
    std::fs::write(&config_path, config.to_vec().unwrap()).unwrap();
    Arc::new(from_parts(&config_path, &parts).unwrap())
}

#[test]
fn empty_base_add_env() {
    let mut opts = OverrideOptions::new("out.json");
    opts.env = strings(&["foo=bar"]);
    let config = override_config(None, &opts);
    assert_eq!(config.config.env, strings(&["foo=bar"]));
}

#[test]
fn env_variable_expansion() {
    let mut base = ConfigFile::default();
    base.config.env = strings(&["foo=bar"]);
    let mut opts = OverrideOptions::new("out.json");
    opts.env = strings(&["foo=$foo:baz"]);
    let config = override_config(Some(base), &opts);
    assert_eq!(config.config.env, strings(&["foo=bar:baz"]));
}

#[test]
fn env_unresolved_variable_is_preserved() {
    let mut opts = OverrideOptions::new("out.json");
    opts.env = strings(&["foo=$foo:baz"]);
    let config = override_config(None, &opts);
    assert_eq!(config.config.env, strings(&["foo=$foo:baz"]));
}

#[test]
fn user_preserved_on_empty_override() {
    let mut base = ConfigFile::default();
    base.config.user = "user".to_string();
    let mut opts = OverrideOptions::new("out.json");
    opts.user = String::new();
    let config = override_config(Some(base), &opts);
    assert_eq!(config.config.user, "user");
}

#[test]
fn entrypoint_prefix_is_prepended() {
    let mut base = ConfigFile::default();
    base.config.entrypoint = strings(&["entrypoint1", "entrypoint2"]);
    let mut opts = OverrideOptions::new("out.json");
    opts.entrypoint = strings(&["entrypoint1", "entrypoint2"]);
    opts.entrypoint_prefix = strings(&["prefix1", "prefix2"]);
    let config = override_config(Some(base), &opts);
    assert_eq!(
        config.config.entrypoint,
        strings(&["prefix1", "prefix2", "entrypoint1", "entrypoint2"])
    );
}

#[test]
fn stamp_substitution_with_duplicates() {
    let dir = TempDir::new().unwrap();
    let stamp = dir.path().join("stamp.txt");
    std::fs::write(&stamp, "key1 value1\nkey1 value12\nkey2 value2").unwrap();
    let stamper = Stamper::from_files(&[stamp]).unwrap();
    assert_eq!(
        stamper.stamp("hello_{key1}_{key2}_hello"),
        "hello_value12_value2_hello"
    );
}

#[test]
fn image_index_construction() {
    let dir = TempDir::new().unwrap();
    let amd = random_image(dir.path(), "linux/amd64");
    let arm = random_image(dir.path(), "linux/arm64/v8");
    let platforms = vec![
        Platform::new("linux", "amd64"),
        "linux/arm64/v8".parse::<Platform>().unwrap(),
    ];

    let index = ImageIndex::new(platforms.clone(), vec![amd.clone(), arm.clone()]).unwrap();
    assert_eq!(index.media_type().unwrap(), MediaType::DockerManifestList);

    let manifest = index.index_manifest().unwrap();
    assert_eq!(manifest.manifests.len(), 2);
    for (desc, (image, platform)) in manifest
        .manifests
        .iter()
        .zip([amd, arm].iter().zip(&platforms))
    {
        assert_eq!(desc.digest, image.digest().unwrap());
        assert_eq!(desc.platform.as_ref(), Some(platform));
    }
}

#[test]
fn write_read_round_trip() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let parts = vec![
        write_layer(src.path(), "compressed", true),
        write_layer(src.path(), "plain", false),
    ];
    let mut config = ConfigFile::default();
    config.rootfs.fs_type = "layers".to_string();
    let config_path = src.path().join("config.json");
    std::fs::write(&config_path, config.to_vec().unwrap()).unwrap();

    let image = from_parts(&config_path, &parts).unwrap();
    let layer_types: Vec<MediaType> = image
        .layers()
        .unwrap()
        .iter()
        .map(|l| l.media_type())
        .collect();
    assert_eq!(
        layer_types,
        vec![MediaType::DockerLayer, MediaType::DockerUncompressedLayer]
    );

    write_image(&image, out.path()).unwrap();
    let read_back = IntermediateLayout::open(out.path()).unwrap().image().unwrap();

    assert_eq!(read_back.raw_manifest().unwrap(), image.raw_manifest().unwrap());
    assert_eq!(read_back.raw_config().unwrap(), image.raw_config().unwrap());
    assert_eq!(read_back.digest().unwrap(), image.digest().unwrap());
    let original: Vec<Hash> = image.layers().unwrap().iter().map(|l| l.digest()).collect();
    let reread: Vec<Hash> = read_back
        .layers()
        .unwrap()
        .iter()
        .map(|l| l.digest())
        .collect();
    assert_eq!(original, reread);
    for (i, part) in parts.iter().enumerate() {
        let on_disk = std::fs::read(out.path().join(format!("{:03}.tar.gz", i))).unwrap();
        assert_eq!(on_disk, std::fs::read(&part.compressed).unwrap());
    }
}

#[test]
fn override_is_idempotent() {
    let mut base = ConfigFile::default();
    base.config.env = strings(&["PATH=/usr/bin", "HOME=/root"]);
    base.config.entrypoint = strings(&["/bin/app"]);

    let mut opts = OverrideOptions::new("out.json");
    opts.creation_time = Some("1553200000".to_string());
    opts.user = "nobody".to_string();
    opts.workdir = "/srv".to_string();
    opts.env = strings(&["LANG=C.UTF-8", "APP_HOME=$HOME/app"]);
    opts.labels = strings(&["org.example.name=demo"]);
    opts.ports = strings(&["8080", "53/udp"]);
    opts.volumes = strings(&["/data"]);
    opts.entrypoint = strings(&["/sbin/tini", "--", "/bin/app"]);
    opts.command = strings(&["serve"]);

    let once = override_config(Some(base), &opts);
    let twice = override_config(Some(once.clone()), &opts);
    assert_eq!(twice.to_vec().unwrap(), once.to_vec().unwrap());
    assert_eq!(
        once.config.entrypoint,
        strings(&["/sbin/tini", "--", "/bin/app"])
    );
}

#[test]
fn env_output_is_sorted_by_key() {
    let mut opts = OverrideOptions::new("out.json");
    opts.env = strings(&["zeta=1", "alpha=2", "Mid=3", "beta=4"]);
    let config = override_config(None, &opts);
    let keys: Vec<&str> = config
        .config
        .env
        .iter()
        .map(|e| e.split_once('=').unwrap().0)
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn as_oci_twice_matches_once() {
    let dir = TempDir::new().unwrap();
    let image = random_image(dir.path(), "linux/amd64");
    let once = as_oci_image(image).unwrap();
    let twice = as_oci_image(Arc::new(once.clone())).unwrap();
    assert_eq!(twice.raw_manifest().unwrap(), once.raw_manifest().unwrap());
}

#[test]
fn assembled_descriptors_hash_layer_files() {
    let dir = TempDir::new().unwrap();
    let parts = vec![
        write_layer(dir.path(), "a", true),
        write_layer(dir.path(), "b", true),
        write_layer(dir.path(), "c", false),
    ];
    let config_path = dir.path().join("config.json");
    std::fs::write(&config_path, b"{}").unwrap();
    let image = from_parts(&config_path, &parts).unwrap();
    let manifest = image.manifest().unwrap();
    for (desc, part) in manifest.layers.iter().zip(&parts) {
        let bytes = std::fs::read(&part.compressed).unwrap();
        assert_eq!(desc.digest, Hash::sha256(&bytes));
        assert_eq!(desc.size, bytes.len() as u64);
    }
}

#[test]
fn foreign_layer_survives_layout_round_trip() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let mut foreign = Descriptor::new(
        MediaType::OciNondistributableLayer,
        2048,
        Hash::sha256(b"nanoserver"),
    );
    foreign.urls = strings(&["https://registry.example.com/nanoserver.tar.gz"]);
    let base = Manifest::new(
        MediaType::OciManifestSchema1,
        Descriptor::new(MediaType::OciConfigJson, 2, Hash::sha256(b"{}")),
        vec![foreign.clone()],
    );
    let base_path = src.path().join("base.json");
    std::fs::write(&base_path, base.to_vec().unwrap()).unwrap();

    let app = write_layer(src.path(), "app", true);
    let app_diff_id =
        Hash::from_hex(std::fs::read_to_string(&app.diff_id_file).unwrap().trim()).unwrap();
    let mut config = ConfigFile::default();
    config.rootfs.fs_type = "layers".to_string();
    config.rootfs.diff_ids = vec![Hash::sha256(b"nanoserver diff"), app_diff_id];
    let config_path = src.path().join("config.json");
    std::fs::write(&config_path, config.to_vec().unwrap()).unwrap();

    let image = read_image(&ImageParts {
        config: config_path,
        base_manifest: Some(base_path),
        layers: vec![app],
    })
    .unwrap();
    let manifest = image.manifest().unwrap();
    assert_eq!(manifest.layers[0].media_type, MediaType::DockerForeignLayer);
    assert_eq!(manifest.layers[0].urls, foreign.urls);
    assert_eq!(manifest.layers[0].digest, foreign.digest);

    write_image(&image, out.path()).unwrap();
    let read_back = IntermediateLayout::open(out.path()).unwrap().image().unwrap();
    assert_eq!(read_back.raw_manifest().unwrap(), image.raw_manifest().unwrap());
    validate_image(&read_back, ValidateOptions { verify_blobs: true }).unwrap();

    let oci = as_oci_image(Arc::new(read_back)).unwrap();
    let oci_manifest = oci.manifest().unwrap();
    assert_eq!(oci_manifest.layers[0].media_type, MediaType::OciNondistributableLayer);
    assert_eq!(oci_manifest.layers[0].urls, foreign.urls);
}
