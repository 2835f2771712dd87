//! SSG-033: DNS zone and certificate stack (`SsgZoneStack`).

use super::StackContext;
use crate::core::inputs::require;
use crate::core::intrinsic::reference;
use crate::core::types::{CfnResource, ExportRef, Stack};
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneHandle {
    pub zone_id: ExportRef,
    pub certificate_arn: ExportRef,
    pub provided_certificate_arn: ExportRef,
}

pub fn build(ctx: &StackContext<'_>, name: &str) -> Result<(Stack, ZoneHandle), String> {
    let zone_name = ctx.inputs.zone_name.as_str();
    let provided = ctx.inputs.certificate_arn.as_str();
    require(name, "certificate ARN", provided)?;
    require(name, "zone name", zone_name)?;
    if !provided.starts_with("arn:") {
        return Err(format!(
            "{}: certificate ARN '{}' must start with 'arn:'",
            name, provided
        ));
    }

    let mut stack = ctx.stack(name, "ScanSafeGuard public hosted zone and certificate");
    stack.add_resource(
        "SsgZone",
        CfnResource::new("AWS::Route53::HostedZone", json!({ "Name": format!("{}.", zone_name) })),
    )?;
    stack.add_resource(
        "SsgCertificate",
        CfnResource::new(
            "AWS::CertificateManager::Certificate",
            json!({
                "DomainName": zone_name,
                "ValidationMethod": "DNS",
                "DomainValidationOptions": [
                    { "DomainName": zone_name, "HostedZoneId": reference("SsgZone") }
                ],
            }),
        ),
    )?;

    let zone_id = stack.export("HostedZoneIdOutput", reference("SsgZone"), "ZoneId")?;
    let certificate_arn = stack.export("CertificateArn", reference("SsgCertificate"), "CertificateArn")?;
    let provided_certificate_arn = stack.export(
        "ProvidedCertificateArn",
        json!(provided),
        "ProvidedCertificateArn",
    )?;

    Ok((
        stack,
        ZoneHandle {
            zone_id,
            certificate_arn,
            provided_certificate_arn,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::fixtures::fixture;

    #[test]
    fn test_ssg033_zone_and_dns_validated_certificate() {
        let f = fixture();
        let (stack, handle) = build(&f.ctx(), "SsgZoneStack").unwrap();
        let zone = stack.resource("SsgZone").unwrap();
        assert_eq!(zone.properties["Name"], "scansafeguard.dev.");
        let cert = stack.resource("SsgCertificate").unwrap();
        assert_eq!(cert.properties["ValidationMethod"], "DNS");
        assert_eq!(
            cert.properties["DomainValidationOptions"][0]["HostedZoneId"],
            json!({"Ref": "SsgZone"})
        );
        assert_eq!(handle.zone_id.name, "ZoneId");
        assert_eq!(handle.certificate_arn.name, "CertificateArn");
    }

    #[test]
    fn test_ssg033_provided_certificate_exported() {
        let f = fixture();
        let (stack, _) = build(&f.ctx(), "SsgZoneStack").unwrap();
        let out = &stack.template.outputs["ProvidedCertificateArn"];
        assert_eq!(out.value, json!(f.inputs.certificate_arn));
    }

    #[test]
    fn test_ssg033_missing_zone_name_rejected() {
        let mut f = fixture();
        f.inputs.zone_name = String::new();
        let err = build(&f.ctx(), "SsgZoneStack").unwrap_err();
        assert_eq!(err, "SsgZoneStack: zone name is required");
    }

    #[test]
    fn test_ssg033_malformed_certificate_rejected() {
        let mut f = fixture();
        f.inputs.certificate_arn = "certificate/abc".into();
        assert!(build(&f.ctx(), "SsgZoneStack").unwrap_err().contains("must start with 'arn:'"));
    }
}
