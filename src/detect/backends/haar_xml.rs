//! Import of OpenCV Haar cascades (`opencv-cascade-classifier` XML).
//!
//! Only boosted stump cascades over upright Haar features are accepted, which covers the
//! stock `haarcascade_frontalface_*.xml` models:
//!
//! ```xml
//! <opencv_storage><cascade>
//!   <stageType>BOOST</stageType><featureType>HAAR</featureType>
//!   <height>24</height><width>24</width>
//!   <stages><_>
//!     <stageThreshold>-5.04</stageThreshold>
//!     <weakClassifiers><_>
//!       <internalNodes>0 -1 0 -3.15e-02</internalNodes>
//!       <leafValues>2.08 -2.21</leafValues></_></weakClassifiers></_></stages>
//!   <features><_><rects><_>6 4 12 9 -1.</_><_>6 7 12 3 3.</_></rects></_></features>
//! </cascade></opencv_storage>
//! ```
//!
//! `internalNodes` is `left right feature_index threshold`; a stump routes values below
//! the threshold to the first leaf and the rest to the second.

use anyhow::{anyhow, bail, Context, Result};
use roxmltree::{Document, Node};

use super::cascade::{CascadeModel, FeatureRect, Stage, WeakClassifier, WindowSize};

/// Parse an OpenCV cascade document into a `CascadeModel`.
pub(crate) fn parse_opencv_cascade(xml: &str) -> Result<CascadeModel> {
    let doc = Document::parse(xml).context("malformed cascade XML")?;
    let cascade = doc
        .descendants()
        .find(|n| n.has_tag_name("cascade"))
        .ok_or_else(|| anyhow!("no <cascade> element (old-style haar XML is not supported)"))?;

    if let Some(kind) = optional_text(cascade, "stageType") {
        if kind != "BOOST" {
            bail!("unsupported stage type {}", kind);
        }
    }
    if let Some(kind) = optional_text(cascade, "featureType") {
        if kind != "HAAR" {
            bail!("unsupported feature type {} (expected HAAR)", kind);
        }
    }
    let window = WindowSize {
        width: parse_number(text(child(cascade, "width")?)?, "width")?,
        height: parse_number(text(child(cascade, "height")?)?, "height")?,
    };

    let features = items(child(cascade, "features")?)
        .enumerate()
        .map(|(i, feature)| parse_feature(feature).with_context(|| format!("feature {}", i)))
        .collect::<Result<Vec<_>>>()?;

    let stages = items(child(cascade, "stages")?)
        .enumerate()
        .map(|(s, stage)| parse_stage(stage, &features).with_context(|| format!("stage {}", s)))
        .collect::<Result<Vec<_>>>()?;

    Ok(CascadeModel { window, stages })
}

fn parse_feature(feature: Node) -> Result<Vec<FeatureRect>> {
    if let Some(tilted) = optional_text(feature, "tilted") {
        if tilted != "0" {
            bail!("tilted features are not supported");
        }
    }
    items(child(feature, "rects")?)
        .map(|rect| -> Result<FeatureRect> {
            let fields: Vec<&str> = text(rect)?.split_whitespace().collect();
            let [x, y, width, height, weight] = fields.as_slice() else {
                bail!("rect needs 5 values, got {}", fields.len());
            };
            Ok(FeatureRect {
                x: parse_number(x, "rect x")?,
                y: parse_number(y, "rect y")?,
                width: parse_number(width, "rect width")?,
                height: parse_number(height, "rect height")?,
                weight: parse_number(weight, "rect weight")?,
            })
        })
        .collect()
}

fn parse_stage(stage: Node, features: &[Vec<FeatureRect>]) -> Result<Stage> {
    let threshold = parse_number(text(child(stage, "stageThreshold")?)?, "stageThreshold")?;
    let classifiers = items(child(stage, "weakClassifiers")?)
        .enumerate()
        .map(|(c, weak)| {
            parse_weak(weak, features).with_context(|| format!("weak classifier {}", c))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak(weak: Node, features: &[Vec<FeatureRect>]) -> Result<WeakClassifier> {
    let nodes: Vec<&str> = text(child(weak, "internalNodes")?)?
        .split_whitespace()
        .collect();
    let leaves: Vec<&str> = text(child(weak, "leafValues")?)?
        .split_whitespace()
        .collect();
    let ([_, _, feature, threshold], [left, right]) = (&nodes[..], &leaves[..]) else {
        bail!(
            "only stump classifiers are supported ({} node values, {} leaves)",
            nodes.len(),
            leaves.len()
        );
    };
    let index: usize = parse_number(feature, "feature index")?;
    let rects = features
        .get(index)
        .ok_or_else(|| anyhow!("feature index {} out of range", index))?
        .clone();
    Ok(WeakClassifier {
        rects,
        threshold: parse_number(threshold, "node threshold")?,
        left: parse_number(left, "leaf value")?,
        right: parse_number(right, "leaf value")?,
    })
}

// ----------------------------------------------------------------------------
// Node helpers
// ----------------------------------------------------------------------------

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>> {
    node.children()
        .find(|c| c.has_tag_name(name))
        .ok_or_else(|| anyhow!("missing <{}> in <{}>", name, node.tag_name().name()))
}

fn optional_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|c| c.has_tag_name(name))
        .and_then(|c| c.text())
        .map(str::trim)
}

fn text<'a>(node: Node<'a, '_>) -> Result<&'a str> {
    node.text()
        .map(str::trim)
        .ok_or_else(|| anyhow!("<{}> has no text", node.tag_name().name()))
}

/// OpenCV stores sequences as `<_>` children.
fn items<'a, 'input: 'a>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(|c| c.has_tag_name("_"))
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid {} {:?}", what, value))
}
