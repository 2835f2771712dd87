//! SSG-031: Network stack (`SsgVpc`).
//!
//! One VPC across three availability zones with a single NAT gateway and
//! three `/24` subnet tiers per zone: public, application (private with
//! egress through the NAT) and data (isolated, no default route).

use super::StackContext;
use crate::core::intrinsic::{get_att, get_azs, join, reference, select, tag};
use crate::core::types::{CfnResource, ExportRef, Stack};
use serde_json::{json, Value};

pub const VPC_ID: &str = "SSGVpc";
pub const VPC_CIDR: &str = "10.0.0.0/16";
pub const MAX_AZS: usize = 3;
pub const NAT_GATEWAYS: usize = 1;
pub const SUBNET_MASK: u8 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetTier {
    Public,
    Application,
    Data,
}

impl SubnetTier {
    pub const ALL: [SubnetTier; 3] = [Self::Public, Self::Application, Self::Data];

    pub fn label(self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Application => "Application",
            Self::Data => "Data",
        }
    }

    fn ordinal(self) -> usize {
        match self {
            Self::Public => 0,
            Self::Application => 1,
            Self::Data => 2,
        }
    }
}

/// Exports of the network stack.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkHandle {
    pub vpc_id: ExportRef,
    pub public_subnets: ExportRef,
    pub application_subnets: ExportRef,
    pub data_subnets: ExportRef,
}

impl NetworkHandle {
    pub fn subnets(&self, tier: SubnetTier) -> &ExportRef {
        match tier {
            SubnetTier::Public => &self.public_subnets,
            SubnetTier::Application => &self.application_subnets,
            SubnetTier::Data => &self.data_subnets,
        }
    }
}

/// `10.0.<n>.0/24`, numbered tier-major so every tier gets a contiguous block.
pub fn subnet_cidr(tier: SubnetTier, az: usize) -> String {
    format!("10.0.{}.0/{}", tier.ordinal() * MAX_AZS + az, SUBNET_MASK)
}

pub fn subnet_id(tier: SubnetTier, az: usize) -> String {
    format!("{}{}Subnet{}", VPC_ID, tier.label(), az + 1)
}

fn name_tag(name: &str) -> Value {
    Value::Array(vec![tag("Name", name)])
}

pub fn build(ctx: &StackContext<'_>, name: &str) -> Result<(Stack, NetworkHandle), String> {
    let mut stack = ctx.stack(name, "ScanSafeGuard network: VPC, subnets and NAT");

    stack.add_resource(
        VPC_ID,
        CfnResource::new(
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": VPC_CIDR,
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": name_tag(VPC_ID),
            }),
        ),
    )?;

    let igw = format!("{}InternetGateway", VPC_ID);
    stack.add_resource(
        &igw,
        CfnResource::new("AWS::EC2::InternetGateway", json!({ "Tags": name_tag(VPC_ID) })),
    )?;
    let attachment = format!("{}GatewayAttachment", VPC_ID);
    stack.add_resource(
        &attachment,
        CfnResource::new(
            "AWS::EC2::VPCGatewayAttachment",
            json!({ "VpcId": reference(VPC_ID), "InternetGatewayId": reference(&igw) }),
        ),
    )?;

    let mut ids: Vec<(SubnetTier, Vec<String>)> = Vec::new();
    for tier in SubnetTier::ALL {
        let mut tier_ids = Vec::new();
        for az in 0..MAX_AZS {
            let subnet = subnet_id(tier, az);
            stack.add_resource(
                &subnet,
                CfnResource::new(
                    "AWS::EC2::Subnet",
                    json!({
                        "VpcId": reference(VPC_ID),
                        "CidrBlock": subnet_cidr(tier, az),
                        "AvailabilityZone": select(az, get_azs()),
                        "MapPublicIpOnLaunch": tier == SubnetTier::Public,
                        "Tags": name_tag(&format!("{}/{}Subnet{}", VPC_ID, tier.label(), az + 1)),
                    }),
                ),
            )?;
            let table = format!("{}RouteTable", subnet);
            stack.add_resource(
                &table,
                CfnResource::new("AWS::EC2::RouteTable", json!({ "VpcId": reference(VPC_ID) })),
            )?;
            stack.add_resource(
                &format!("{}RouteTableAssociation", subnet),
                CfnResource::new(
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({ "RouteTableId": reference(&table), "SubnetId": reference(&subnet) }),
                ),
            )?;
            tier_ids.push(subnet);
        }
        ids.push((tier, tier_ids));
    }

    // Public routes go to the internet gateway; NAT gateways live in the
    // first public subnets.
    let mut nats = Vec::new();
    for (az, subnet) in ids[SubnetTier::Public.ordinal()].1.iter().enumerate() {
        stack.add_resource(
            &format!("{}DefaultRoute", subnet),
            CfnResource::new(
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": reference(&format!("{}RouteTable", subnet)),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "GatewayId": reference(&igw),
                }),
            )
            .depends_on(&attachment),
        )?;
        if az < NAT_GATEWAYS {
            let eip = format!("{}EIP", subnet);
            stack.add_resource(&eip, CfnResource::new("AWS::EC2::EIP", json!({ "Domain": "vpc" })))?;
            let nat = format!("{}NATGateway", subnet);
            stack.add_resource(
                &nat,
                CfnResource::new(
                    "AWS::EC2::NatGateway",
                    json!({
                        "SubnetId": reference(subnet),
                        "AllocationId": get_att(&eip, "AllocationId"),
                    }),
                )
                .depends_on(&format!("{}DefaultRoute", subnet)),
            )?;
            nats.push(nat);
        }
    }

    if nats.is_empty() {
        return Err(format!("{}: at least one NAT gateway is required", name));
    }
    for (az, subnet) in ids[SubnetTier::Application.ordinal()].1.iter().enumerate() {
        let nat = &nats[az % nats.len()];
        stack.add_resource(
            &format!("{}DefaultRoute", subnet),
            CfnResource::new(
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": reference(&format!("{}RouteTable", subnet)),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "NatGatewayId": reference(nat),
                }),
            ),
        )?;
    }

    let vpc_id = stack.export("SSGVpcId", reference(VPC_ID), "SSGVpcId")?;
    let mut subnet_exports = Vec::new();
    for (tier, tier_ids) in &ids {
        let export_name = format!("SSG{}SubnetIds", tier.label());
        let refs = tier_ids.iter().map(|s| reference(s)).collect();
        subnet_exports.push(stack.export(&export_name, join(",", refs), &export_name)?);
    }
    let [public_subnets, application_subnets, data_subnets]: [ExportRef; 3] = subnet_exports
        .try_into()
        .map_err(|_| format!("{}: expected three subnet tiers", name))?;

    tracing::debug!(stack = %stack.name, resources = stack.resource_count(), "network stack built");
    Ok((
        stack,
        NetworkHandle {
            vpc_id,
            public_subnets,
            application_subnets,
            data_subnets,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::fixtures::fixture;

    #[test]
    fn test_ssg031_three_tiers_across_every_az() {
        let f = fixture();
        let (stack, _) = build(&f.ctx(), "SsgVpc").unwrap();
        assert_eq!(
            stack.resources_of_type("AWS::EC2::Subnet").count(),
            SubnetTier::ALL.len() * MAX_AZS
        );
        for tier in SubnetTier::ALL {
            for az in 0..MAX_AZS {
                let s = stack.resource(&subnet_id(tier, az)).unwrap();
                assert_eq!(s.properties["CidrBlock"], subnet_cidr(tier, az));
                assert_eq!(s.properties["AvailabilityZone"]["Fn::Select"][0], az.to_string());
            }
        }
    }

    #[test]
    fn test_ssg031_cidrs_do_not_overlap() {
        let mut seen = std::collections::HashSet::new();
        for tier in SubnetTier::ALL {
            for az in 0..MAX_AZS {
                assert!(seen.insert(subnet_cidr(tier, az)));
            }
        }
        assert_eq!(subnet_cidr(SubnetTier::Data, 2), "10.0.8.0/24");
    }

    #[test]
    fn test_ssg031_single_nat_and_routes() {
        let f = fixture();
        let (stack, _) = build(&f.ctx(), "SsgVpc").unwrap();
        assert_eq!(stack.resources_of_type("AWS::EC2::NatGateway").count(), NAT_GATEWAYS);
        // public and application subnets route out; data subnets do not
        assert_eq!(stack.resources_of_type("AWS::EC2::Route").count(), 2 * MAX_AZS);
        assert!(stack.resource("SSGVpcDataSubnet1DefaultRoute").is_none());
        let app_route = stack.resource("SSGVpcApplicationSubnet2DefaultRoute").unwrap();
        assert_eq!(
            app_route.properties["NatGatewayId"],
            json!({"Ref": "SSGVpcPublicSubnet1NATGateway"})
        );
    }

    #[test]
    fn test_ssg031_exports_vpc_id() {
        let f = fixture();
        let (stack, handle) = build(&f.ctx(), "SsgVpc").unwrap();
        assert_eq!(handle.vpc_id.name, "SSGVpcId");
        assert_eq!(handle.vpc_id.stack, "SsgVpc");
        assert_eq!(handle.subnets(SubnetTier::Public).name, "SSGPublicSubnetIds");
        let exports = stack.export_names();
        assert!(exports.contains(&"SSGApplicationSubnetIds"));
        assert!(exports.contains(&"SSGDataSubnetIds"));
    }

    #[test]
    fn test_ssg031_public_subnets_map_public_ips() {
        let f = fixture();
        let (stack, _) = build(&f.ctx(), "SsgVpc").unwrap();
        let public = stack.resource("SSGVpcPublicSubnet1").unwrap();
        assert_eq!(public.properties["MapPublicIpOnLaunch"], true);
        let data = stack.resource("SSGVpcDataSubnet1").unwrap();
        assert_eq!(data.properties["MapPublicIpOnLaunch"], false);
    }
}
