//! POM reading
//!
//! Only what transitive expansion needs is read: coordinates, parent,
//! properties, dependencies and dependency management. Profiles, build
//! plugins and everything else are ignored.

use crate::model::ModuleId;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

const MAX_INTERPOLATION_PASSES: usize = 8;

/// A `<dependency>` element as written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PomDependency {
    pub group: String,
    pub artifact: String,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub classifier: Option<String>,
    /// `<type>`, `jar` when absent
    pub kind: Option<String>,
    pub optional: bool,
    pub exclusions: Vec<ModuleId>,
}

impl PomDependency {
    /// Key used to match a dependency against dependency management
    pub fn management_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.group,
            self.artifact,
            self.kind.as_deref().unwrap_or("jar"),
            self.classifier.as_deref().unwrap_or("")
        )
    }

    /// Whether this dependency is on the runtime classpath
    pub fn is_runtime(&self) -> bool {
        matches!(self.scope.as_deref(), None | Some("compile") | Some("runtime"))
    }

    /// Fill in blanks from a managed entry
    pub fn apply_management(&mut self, managed: &PomDependency) {
        if self.version.is_none() {
            self.version = managed.version.clone();
        }
        if self.scope.is_none() {
            self.scope = managed.scope.clone();
        }
        for exclusion in &managed.exclusions {
            if !self.exclusions.contains(exclusion) {
                self.exclusions.push(exclusion.clone());
            }
        }
    }

    /// Substitute `${...}` references in every field
    pub fn interpolate(&mut self, properties: &HashMap<String, String>) {
        let apply = |value: &mut String| *value = interpolate(value, properties);
        apply(&mut self.group);
        apply(&mut self.artifact);
        for field in [
            &mut self.version,
            &mut self.scope,
            &mut self.classifier,
            &mut self.kind,
        ]
        .into_iter()
        .flatten()
        {
            apply(field);
        }
    }
}

/// `<parent>` reference
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentRef {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

/// The parts of a POM used for resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pom {
    pub group: Option<String>,
    pub artifact: String,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub parent: Option<ParentRef>,
    pub properties: HashMap<String, String>,
    pub managed: Vec<PomDependency>,
    pub dependencies: Vec<PomDependency>,
}

impl Pom {
    pub fn parse(xml: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut path: Vec<String> = Vec::new();
        let mut pom = Pom::default();
        let mut dependency: Option<PomDependency> = None;
        let mut exclusion: Option<ModuleId> = None;
        let mut saw_project = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    let p: Vec<&str> = path.iter().map(String::as_str).collect();
                    match p.as_slice() {
                        ["project"] => saw_project = true,
                        ["project", "dependencies", "dependency"]
                        | ["project", "dependencyManagement", "dependencies", "dependency"] => {
                            dependency = Some(PomDependency::default());
                        }
                        [.., "dependency", "exclusions", "exclusion"] if dependency.is_some() => {
                            exclusion = Some(ModuleId::new("", ""));
                        }
                        _ => {}
                    }
                }
                Ok(Event::End(_)) => {
                    let p: Vec<&str> = path.iter().map(String::as_str).collect();
                    match p.as_slice() {
                        ["project", "dependencies", "dependency"] => {
                            if let Some(d) = dependency.take() {
                                pom.dependencies.push(d);
                            }
                        }
                        ["project", "dependencyManagement", "dependencies", "dependency"] => {
                            if let Some(d) = dependency.take() {
                                pom.managed.push(d);
                            }
                        }
                        [.., "exclusions", "exclusion"] => {
                            if let (Some(d), Some(x)) = (dependency.as_mut(), exclusion.take()) {
                                d.exclusions.push(x);
                            }
                        }
                        _ => {}
                    }
                    path.pop();
                }
                Ok(Event::Text(t)) => {
                    let text = t.unescape().map_err(|e| e.to_string())?;
                    pom.assign(&path, text.trim(), &mut dependency, &mut exclusion);
                }
                Ok(Event::CData(t)) => {
                    let text = String::from_utf8_lossy(&t).into_owned();
                    pom.assign(&path, text.trim(), &mut dependency, &mut exclusion);
                }
                Ok(Event::Eof) => {
                    if let Some(open) = path.last() {
                        return Err(format!("unexpected end of document inside <{}>", open));
                    }
                    break;
                }
                Err(e) => {
                    return Err(format!(
                        "XML error at byte {}: {}",
                        reader.buffer_position(),
                        e
                    ))
                }
                Ok(_) => {}
            }
        }

        if !saw_project {
            return Err("no <project> element".to_string());
        }
        if pom.artifact.is_empty() {
            return Err("missing <artifactId>".to_string());
        }
        Ok(pom)
    }

    fn assign(
        &mut self,
        path: &[String],
        text: &str,
        dependency: &mut Option<PomDependency>,
        exclusion: &mut Option<ModuleId>,
    ) {
        let value = text.to_string();
        let p: Vec<&str> = path.iter().map(String::as_str).collect();
        match p.as_slice() {
            ["project", "groupId"] => self.group = Some(value),
            ["project", "artifactId"] => self.artifact = value,
            ["project", "version"] => self.version = Some(value),
            ["project", "packaging"] => self.packaging = Some(value),
            ["project", "parent", field] => {
                let parent = self.parent.get_or_insert_with(ParentRef::default);
                match *field {
                    "groupId" => parent.group = value,
                    "artifactId" => parent.artifact = value,
                    "version" => parent.version = value,
                    _ => {}
                }
            }
            ["project", "properties", name] => {
                self.properties.insert(name.to_string(), value);
            }
            [.., "exclusion", field] => {
                if let Some(x) = exclusion.as_mut() {
                    match *field {
                        "groupId" => x.group = value,
                        "artifactId" => x.artifact = value,
                        _ => {}
                    }
                }
            }
            [.., "dependency", field] => {
                if let Some(d) = dependency.as_mut() {
                    match *field {
                        "groupId" => d.group = value,
                        "artifactId" => d.artifact = value,
                        "version" => d.version = Some(value),
                        "scope" => d.scope = Some(value),
                        "classifier" => d.classifier = Some(value),
                        "type" => d.kind = Some(value),
                        "optional" => d.optional = value.eq_ignore_ascii_case("true"),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

/// Replace `${name}` references; unknown names are left as written
pub fn interpolate(value: &str, properties: &HashMap<String, String>) -> String {
    let mut current = value.to_string();
    for _ in 0..MAX_INTERPOLATION_PASSES {
        if !current.contains("${") {
            break;
        }
        let mut out = String::with_capacity(current.len());
        let mut rest = current.as_str();
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match properties.get(name) {
                        Some(v) => out.push_str(v),
                        None => {
                            out.push_str("${");
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        if out == current {
            break;
        }
        current = out;
    }
    current
}

/// Concrete version for a version spec; ranges resolve to their inclusive
/// bound (lower first). `None` for exclusive or open ranges.
pub fn pin_version(spec: &str) -> Option<String> {
    let spec = spec.trim();
    if spec.is_empty() || spec.contains("${") {
        return None;
    }
    let Some(first) = spec.chars().next() else {
        return None;
    };
    if first != '[' && first != '(' {
        return Some(spec.to_string());
    }

    // Only the first range of a union is considered
    let range = spec.split_inclusive([']', ')']).next().unwrap_or(spec);
    if range.len() < 2 {
        return None;
    }
    let last = range.chars().last()?;
    let inner = &range[1..range.len() - 1];
    let (lower, upper) = match inner.split_once(',') {
        Some((lower, upper)) => (lower.trim(), upper.trim()),
        None => (inner.trim(), inner.trim()),
    };

    if first == '[' && !lower.is_empty() {
        Some(lower.to_string())
    } else if last == ']' && !upper.is_empty() {
        Some(upper.to_string())
    } else {
        None
    }
}

/// Whether `module` matches any exclusion; `*` matches anything
pub fn is_excluded(exclusions: &[ModuleId], module: &ModuleId) -> bool {
    exclusions.iter().any(|x| {
        (x.group == "*" || x.group == module.group)
            && (x.artifact == "*" || x.artifact == module.artifact)
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal POM with the given dependencies block
    pub(crate) fn pom_xml(coordinate: &str, dependencies: &[&str]) -> String {
        let parts: Vec<&str> = coordinate.split(':').collect();
        let deps = dependencies
            .iter()
            .map(|d| {
                let p: Vec<&str> = d.split(':').collect();
                format!(
                    "<dependency><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version></dependency>",
                    p[0], p[1], p[2]
                )
            })
            .collect::<String>();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <modelVersion>4.0.0</modelVersion>
  <groupId>{}</groupId>
  <artifactId>{}</artifactId>
  <version>{}</version>
  <dependencies>{}</dependencies>
</project>"#,
            parts[0], parts[1], parts[2], deps
        )
    }

    const FULL: &str = r#"<?xml version="1.0"?>
<project>
  <parent>
    <groupId>org.example</groupId>
    <artifactId>parent</artifactId>
    <version>7</version>
  </parent>
  <artifactId>child</artifactId>
  <packaging>jar</packaging>
  <properties>
    <guava.version>33.0.0-jre</guava.version>
  </properties>
  <dependencyManagement>
    <dependencies>
      <dependency>
        <groupId>org.slf4j</groupId>
        <artifactId>slf4j-api</artifactId>
        <version>2.0.9</version>
      </dependency>
    </dependencies>
  </dependencyManagement>
  <dependencies>
    <dependency>
      <groupId>com.google.guava</groupId>
      <artifactId>guava</artifactId>
      <version>${guava.version}</version>
      <exclusions>
        <exclusion>
          <groupId>com.google.code.findbugs</groupId>
          <artifactId>jsr305</artifactId>
        </exclusion>
      </exclusions>
    </dependency>
    <dependency>
      <groupId>org.slf4j</groupId>
      <artifactId>slf4j-api</artifactId>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13.2</version>
      <scope>test</scope>
    </dependency>
    <dependency>
      <groupId>org.example</groupId>
      <artifactId>extra</artifactId>
      <version>1.0</version>
      <optional>true</optional>
    </dependency>
  </dependencies>
  <profiles>
    <profile>
      <dependencies>
        <dependency>
          <groupId>ignored</groupId>
          <artifactId>ignored</artifactId>
          <version>1</version>
        </dependency>
      </dependencies>
    </profile>
  </profiles>
</project>"#;

    #[test]
    fn parses_relevant_sections() {
        let pom = Pom::parse(FULL).unwrap();

        assert_eq!(pom.group, None);
        assert_eq!(pom.artifact, "child");
        assert_eq!(
            pom.parent,
            Some(ParentRef {
                group: "org.example".into(),
                artifact: "parent".into(),
                version: "7".into(),
            })
        );
        assert_eq!(pom.properties["guava.version"], "33.0.0-jre");
        assert_eq!(pom.managed.len(), 1);
        assert_eq!(pom.dependencies.len(), 4);

        let guava = &pom.dependencies[0];
        assert_eq!(guava.version.as_deref(), Some("${guava.version}"));
        assert_eq!(
            guava.exclusions,
            vec![ModuleId::new("com.google.code.findbugs", "jsr305")]
        );

        assert!(!pom.dependencies[2].is_runtime());
        assert!(pom.dependencies[3].optional);
        assert!(pom.dependencies.iter().all(|d| d.group != "ignored"));
    }

    #[test]
    fn management_and_interpolation() {
        let pom = Pom::parse(FULL).unwrap();
        let mut slf4j = pom.dependencies[1].clone();
        slf4j.apply_management(&pom.managed[0]);
        assert_eq!(slf4j.version.as_deref(), Some("2.0.9"));

        let mut guava = pom.dependencies[0].clone();
        guava.interpolate(&pom.properties);
        assert_eq!(guava.version.as_deref(), Some("33.0.0-jre"));
    }

    #[test]
    fn rejects_non_poms() {
        assert!(Pom::parse("<html><body/></html>").is_err());
        assert!(Pom::parse("<project><artifactId>x</artifactId>").is_err());
        assert!(Pom::parse("not xml at all <<<").is_err());
    }

    #[test]
    fn interpolation_is_recursive_and_leaves_unknowns() {
        let props: HashMap<String, String> = [
            ("a".to_string(), "${b}-x".to_string()),
            ("b".to_string(), "1".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(interpolate("v${a}", &props), "v1-x");
        assert_eq!(interpolate("${missing}", &props), "${missing}");
        assert_eq!(interpolate("${unterminated", &props), "${unterminated");
    }

    #[test]
    fn version_pinning() {
        assert_eq!(pin_version("1.2.3").as_deref(), Some("1.2.3"));
        assert_eq!(pin_version("[1.2.3]").as_deref(), Some("1.2.3"));
        assert_eq!(pin_version("[1.0,2.0)").as_deref(), Some("1.0"));
        assert_eq!(pin_version("(,1.5]").as_deref(), Some("1.5"));
        assert_eq!(pin_version("(1.0,2.0)"), None);
        assert_eq!(pin_version("${unresolved}"), None);
    }

    #[test]
    fn exclusion_wildcards() {
        let module = ModuleId::new("org.slf4j", "slf4j-api");
        assert!(is_excluded(&[ModuleId::new("org.slf4j", "*")], &module));
        assert!(is_excluded(&[ModuleId::new("*", "*")], &module));
        assert!(!is_excluded(&[ModuleId::new("org.slf4j", "other")], &module));
    }

    #[test]
    fn helper_builds_parseable_pom() {
        let pom = Pom::parse(&pom_xml("g:a:1", &["g:b:2"])).unwrap();
        assert_eq!(pom.dependencies[0].version.as_deref(), Some("2"));
    }
}
